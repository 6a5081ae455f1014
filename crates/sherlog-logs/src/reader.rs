use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use sherlog_types::Line;

use crate::error::PipelineError;
use crate::pipeline::forward;

/// Path that reads standard input instead of a file
pub const STDIN_PATH: &str = "-";

/// Producer of raw lines for a pipeline run
///
/// Implementations send every line to `out` in order and return `Ok(())` at
/// end of input. Once `cancel` fires they should return promptly; a failed
/// send means downstream has stopped and is not an error.
pub trait LineSource: Send + 'static {
    fn read(
        self,
        out: &mpsc::Sender<Line>,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(), PipelineError>> + Send;
}

/// Reads files one after the other
///
/// Line numbers restart at 1 for each file. The path `-` reads stdin.
#[derive(Clone, Debug)]
pub struct FileSource {
    paths: Vec<PathBuf>,
}

impl FileSource {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

impl LineSource for FileSource {
    fn read(
        self,
        out: &mpsc::Sender<Line>,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(), PipelineError>> + Send {
        async move {
            for path in &self.paths {
                if cancel.is_cancelled() {
                    break;
                }

                let source_id: Arc<str> = Arc::from(path.display().to_string());
                let finished = if path.as_os_str() == STDIN_PATH {
                    let reader = BufReader::new(tokio::io::stdin());
                    read_lines(reader, &source_id, out, cancel).await?
                } else {
                    let file = File::open(path).await.map_err(|source| PipelineError::Io {
                        source_id: source_id.to_string(),
                        source,
                    })?;
                    read_lines(BufReader::new(file), &source_id, out, cancel).await?
                };

                if !finished {
                    break;
                }
            }
            Ok(())
        }
    }
}

/// Lines held in memory under a single source id
#[derive(Clone, Debug)]
pub struct TextSource {
    source_id: Arc<str>,
    text: String,
}

impl TextSource {
    pub fn new(source_id: impl Into<Arc<str>>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
        }
    }
}

impl LineSource for TextSource {
    fn read(
        self,
        out: &mpsc::Sender<Line>,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(), PipelineError>> + Send {
        async move {
            read_lines(self.text.as_bytes(), &self.source_id, out, cancel).await?;
            Ok(())
        }
    }
}

/// Send every line of `reader`; returns false if stopped before the end
///
/// Invalid UTF-8 is replaced rather than failing the run.
async fn read_lines<R>(
    mut reader: R,
    source_id: &Arc<str>,
    out: &mpsc::Sender<Line>,
    cancel: &CancellationToken,
) -> Result<bool, PipelineError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut index: u64 = 0;

    loop {
        buf.clear();
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(false),
            read = reader.read_until(b'\n', &mut buf) => read,
        };
        let read = read.map_err(|source| PipelineError::Io {
            source_id: source_id.to_string(),
            source,
        })?;
        if read == 0 {
            tracing::debug!(source = %source_id, lines = index, "finished reading");
            return Ok(true);
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }

        index += 1;
        let line = Line::new(Arc::clone(source_id), index, String::from_utf8_lossy(&buf));
        if !forward(out, cancel, line).await {
            tracing::debug!(source = %source_id, lines = index, "reader stopped early");
            return Ok(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    async fn collect<S: LineSource>(source: S) -> Result<Vec<Line>, PipelineError> {
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let reader = tokio::spawn(async move { source.read(&tx, &cancel).await });

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        reader.await.unwrap()?;
        Ok(lines)
    }

    #[tokio::test]
    async fn test_text_source_numbers_lines() {
        let lines = collect(TextSource::new("mem", "one\r\ntwo\n\nfour")).await.unwrap();
        let contents: Vec<&str> = lines.iter().map(|l| l.content.as_str()).collect();
        assert_eq!(contents, ["one", "two", "", "four"]);
        assert_eq!(lines[3].index, 4);
        assert_eq!(&*lines[0].source, "mem");
    }

    #[tokio::test]
    async fn test_file_source_reads_files_in_order() {
        let mut first = tempfile::NamedTempFile::new().unwrap();
        write!(first, "a1\na2\n").unwrap();
        let mut second = tempfile::NamedTempFile::new().unwrap();
        write!(second, "b1\n").unwrap();

        let source = FileSource::new([first.path(), second.path()]);
        let lines = collect(source).await.unwrap();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].content, "a2");
        assert_eq!(lines[1].index, 2);
        assert_eq!(lines[2].content, "b1");
        assert_eq!(lines[2].index, 1);
        assert_eq!(&*lines[2].source, second.path().display().to_string());
    }

    #[tokio::test]
    async fn test_file_source_missing_file() {
        let source = FileSource::new(["/nonexistent/server.log"]);
        let err = collect(source).await.unwrap_err();
        assert!(
            matches!(err, PipelineError::Io { ref source_id, .. } if source_id == "/nonexistent/server.log")
        );
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"ok\n\xff\xfe bad\n").unwrap();

        let lines = collect(FileSource::new([file.path()])).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].content.ends_with(" bad"));
    }

    #[tokio::test]
    async fn test_cancelled_source_stops() {
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = TextSource::new("mem", "a\nb\nc").read(&tx, &cancel).await;
        assert!(result.is_ok());
    }
}
