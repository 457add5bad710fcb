//! Ways to run a [`SolverWorker`]: a dedicated thread in this process, or a
//! child process speaking one JSON frame per line on stdin/stdout.

use std::ffi::OsStr;
use std::io::{self, BufRead, Write};
use std::process::Stdio;
use std::thread;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::solver::SearchConfig;

use super::protocol::{RequestFrame, WorkerMessage};
use super::service::SolverWorker;

/// Host-side ends of a worker connection.
pub struct WorkerChannels {
    pub outbound: mpsc::UnboundedSender<RequestFrame>,
    pub inbound: mpsc::UnboundedReceiver<WorkerMessage>,
}

/// Run a worker on its own OS thread. The thread exits once every sender
/// for its inbound channel is dropped.
pub fn spawn_thread(search: SearchConfig) -> io::Result<WorkerChannels> {
    let (req_tx, req_rx) = mpsc::unbounded_channel();
    let (msg_tx, msg_rx) = mpsc::unbounded_channel();
    thread::Builder::new()
        .name("solver-worker".into())
        .spawn(move || SolverWorker::new(search).run(req_rx, msg_tx))?;
    Ok(WorkerChannels { outbound: req_tx, inbound: msg_rx })
}

/// Spawn `program args..` as a worker process and bridge its stdio to
/// channels. Must be called from within a tokio runtime.
///
/// The child is killed when the reader task ends, which happens when it
/// closes stdout or the host drops the inbound receiver.
pub fn spawn_process<I, S>(program: impl AsRef<OsStr>, args: I) -> io::Result<WorkerChannels>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()?;
    let stdin = child.stdin.take().ok_or_else(|| io::Error::other("worker has no stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| io::Error::other("worker has no stdout"))?;

    let (req_tx, mut req_rx) = mpsc::unbounded_channel::<RequestFrame>();
    let (msg_tx, msg_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut stdin = stdin;
        while let Some(frame) = req_rx.recv().await {
            let mut line = match serde_json::to_vec(&frame) {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("cannot encode worker frame: {e}");
                    continue;
                }
            };
            line.push(b'\n');
            if let Err(e) = stdin.write_all(&line).await {
                tracing::warn!("worker write error: {e}");
                break;
            }
            if let Err(e) = stdin.flush().await {
                tracing::warn!("worker flush error: {e}");
                break;
            }
        }
    });

    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match serde_json::from_str::<WorkerMessage>(&line) {
                    Ok(message) => {
                        if msg_tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("ignoring malformed worker line: {e}"),
                },
                Ok(None) => {
                    tracing::info!("worker process closed stdout");
                    break;
                }
                Err(e) => {
                    tracing::warn!("worker read error: {e}");
                    break;
                }
            }
        }
        drop(child);
    });

    Ok(WorkerChannels { outbound: req_tx, inbound: msg_rx })
}

/// Serve the worker protocol over line-delimited JSON until `input` ends.
///
/// Lines that do not parse as a request frame are skipped; without an id
/// there is nobody to answer.
pub fn serve_lines<R: BufRead, W: Write>(input: R, mut output: W, search: SearchConfig) -> io::Result<()> {
    let mut worker = SolverWorker::new(search);
    write_message(&mut output, &WorkerMessage::Ready)?;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: RequestFrame = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("skipping malformed request line: {e}");
                continue;
            }
        };
        let response = worker.handle(frame.request);
        write_message(&mut output, &WorkerMessage::Reply { id: frame.id, response })?;
    }
    Ok(())
}

/// [`serve_lines`] on this process's stdin/stdout.
pub fn serve_stdio(search: SearchConfig) -> io::Result<()> {
    serve_lines(io::stdin().lock(), io::stdout().lock(), search)
}

fn write_message<W: Write>(output: &mut W, message: &WorkerMessage) -> io::Result<()> {
    serde_json::to_writer(&mut *output, message)?;
    output.write_all(b"\n")?;
    output.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::protocol::{Request, Response};

    fn quick() -> SearchConfig { SearchConfig { depth_cap: Some(1), adversary_depth: 1, ..SearchConfig::default() } }

    #[test]
    fn serves_json_lines() {
        let input = concat!(
            r#"{"id":1,"request":{"type":"SETUP"}}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"id":2,"request":{"type":"BOARD","tiles":[2,2,0,0,0,0,0,0,0,0,0,0,0,0,0,0]}}"#,
            "\n",
            r#"{"id":3,"request":{"type":"BOARD","tiles":[2,2]}}"#,
            "\n",
        );
        let mut out = Vec::new();
        serve_lines(input.as_bytes(), &mut out, quick()).unwrap();
        let messages: Vec<WorkerMessage> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], WorkerMessage::Ready);
        assert_eq!(messages[1], WorkerMessage::Reply { id: 1, response: Response::Setup });
        assert_eq!(messages[2], WorkerMessage::Reply { id: 2, response: Response::Board });
        assert!(matches!(messages[3], WorkerMessage::Reply { id: 3, response: Response::Failed { .. } }));
    }

    #[tokio::test]
    async fn thread_worker_answers_and_exits() {
        let WorkerChannels { outbound, mut inbound } = spawn_thread(quick()).unwrap();
        assert_eq!(inbound.recv().await, Some(WorkerMessage::Ready));
        outbound.send(RequestFrame { id: 7, request: Request::Reset { seed: Some(3) } }).unwrap();
        assert_eq!(inbound.recv().await, Some(WorkerMessage::Reply { id: 7, response: Response::Reset }));
        drop(outbound);
        assert_eq!(inbound.recv().await, None);
    }
}
