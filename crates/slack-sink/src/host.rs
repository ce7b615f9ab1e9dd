use std::collections::VecDeque;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::app_config::ConfigStore;
use crate::delivery::{DeliveryOutcome, SlackSink};
use crate::endpoint::redact;
use crate::schema::Schema;
use crate::transport::Transport;
use crate::tuple::{BatchedTuple, RecordError, Tuple, Value};

const INPUT_CHANNEL_CAPACITY: usize = 1024;
/// Most tuples held in the batch queue. Once full, the channel fills up and
/// the reader stops pulling lines from the input.
const MAX_QUEUED: usize = 1024;

/// Turn one input line into a tuple.
///
/// A schema with a single string attribute takes the raw line as its value;
/// any other schema expects a JSON object per line. Blank lines yield `None`.
pub fn parse_record(schema: &Schema, line: &str) -> Result<Option<Tuple>, RecordError> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    if let [only] = schema.attributes()
        && only.ty.is_string()
    {
        return Ok(Some(Tuple::new(vec![Value::from(line)])));
    }
    let json: serde_json::Value =
        serde_json::from_str(line).map_err(|e| RecordError::InvalidJson(e.to_string()))?;
    Tuple::from_json(schema, &json).map(Some)
}

async fn read_records<R>(reader: R, schema: Schema, tx: mpsc::Sender<Tuple>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0u64;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "stopped reading input");
                break;
            }
        };
        line_no += 1;
        match parse_record(&schema, &line) {
            Ok(Some(tuple)) => {
                if tx.send(tuple).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(line = line_no, error = %e, "skipping input record"),
        }
    }
    debug!(lines = line_no, "input exhausted");
}

/// Feed input lines through `sink` until the input ends and the queue is
/// drained, or until `cancel` fires. Returns how many tuples were left
/// undelivered.
///
/// Cancellation is only observed between deliveries. A head that was not
/// acknowledged is presented again after `retry_interval`.
pub async fn run<R, T, S>(
    mut sink: SlackSink<T, S>,
    schema: &Schema,
    reader: R,
    retry_interval: Duration,
    cancel: CancellationToken,
) -> usize
where
    R: AsyncBufRead + Unpin + Send + 'static,
    T: Transport,
    S: ConfigStore,
{
    debug!(
        mode = sink.mode().name(),
        url = %sink.current_url().map(redact).unwrap_or_default(),
        "stage running"
    );

    let (tx, mut rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
    let reader_task = tokio::spawn(read_records(reader, schema.clone(), tx));
    let mut queue: VecDeque<BatchedTuple> = VecDeque::new();

    loop {
        if cancel.is_cancelled() {
            break;
        }
        while queue.len() < MAX_QUEUED {
            match rx.try_recv() {
                Ok(tuple) => queue.push_back(BatchedTuple::new(tuple)),
                Err(_) => break,
            }
        }

        if queue.is_empty() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(tuple) => queue.push_back(BatchedTuple::new(tuple)),
                    None => break,
                },
            }
            continue;
        }

        match sink.deliver(&mut queue).await {
            DeliveryOutcome::Acked | DeliveryOutcome::Idle => continue,
            DeliveryOutcome::Rejected { status } => {
                debug!(%status, queued = queue.len(), "head rejected, retrying");
            }
            DeliveryOutcome::Failed => {
                debug!(queued = queue.len(), "head not delivered, retrying");
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(retry_interval) => {}
        }
    }

    reader_task.abort();
    sink.shutdown();
    queue.len() + rx.len()
}
