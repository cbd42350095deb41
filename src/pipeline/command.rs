//! The production [`BackgroundRemover`]: one external tool process per call.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use image::DynamicImage;
use tokio::process::Command;

use crate::config::PipelineConfig;
use crate::observability::metrics;
use crate::pipeline::codec;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::process::{self, RunError};
use crate::pipeline::{BackgroundRemover, ExecutionRequest};

/// Invokes the external background-removal executable.
///
/// The program is executed directly from an argument vector; no shell is
/// involved, so nothing in the request can reach a command line.
#[derive(Debug, Clone)]
pub struct RembgCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl RembgCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: None,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.tool_path.clone(), config.tool_args.clone()).with_timeout(config.timeout())
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Human-readable command line for logs and error messages.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    async fn execute(&self, request: ExecutionRequest) -> PipelineResult<DynamicImage> {
        let ExecutionRequest { image, cancel } = request;
        let command_line = self.command_line();

        let input = codec::encode_png_blocking(image).await?;

        let _active = metrics::ActiveToolGuard::new();
        let output = process::run(self.command(), input, &cancel, self.timeout)
            .await
            .map_err(|e| match e {
                RunError::Spawn(source) => PipelineError::Spawn {
                    command: command_line.clone(),
                    source,
                },
                RunError::Io(source) => PipelineError::Io {
                    command: command_line.clone(),
                    source,
                },
                RunError::Cancelled => PipelineError::Cancelled {
                    command: command_line.clone(),
                },
                RunError::DeadlineExceeded(after) => PipelineError::Timeout {
                    command: command_line.clone(),
                    after,
                },
            })?;

        if !output.status.success() {
            let stderr = output.stderr_lossy();
            tracing::error!(
                cmd = %command_line,
                status = %output.status,
                stderr = %stderr,
                "Error while running background removal tool"
            );
            return Err(PipelineError::ExternalTool {
                command: command_line,
                status: output.status.to_string(),
                stderr,
            });
        }

        let stdout = output.stdout;
        tokio::task::spawn_blocking(move || codec::decode(&stdout))
            .await?
            .map_err(|source| PipelineError::OutputDecode {
                command: command_line,
                source,
            })
    }
}

#[async_trait]
impl BackgroundRemover for RembgCommand {
    async fn process(&self, request: ExecutionRequest) -> PipelineResult<DynamicImage> {
        let started = Instant::now();
        let result = self.execute(request).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind().as_str(),
        };
        metrics::record_tool_run(outcome, started);

        result
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::pipeline::ErrorKind;
    use image::{Rgba, RgbaImage};
    use std::io::Write;
    use tokio_util::sync::CancellationToken;

    /// A fake tool script in a temp dir. It runs through `/bin/sh` rather
    /// than being exec'd directly so parallel tests never hit ETXTBSY.
    struct FakeTool {
        _dir: tempfile::TempDir,
        path: PathBuf,
    }

    impl FakeTool {
        fn new(body: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("rembg");
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "{}", body).unwrap();
            Self { _dir: dir, path }
        }

        fn command(&self) -> RembgCommand {
            RembgCommand::new(
                "/bin/sh",
                vec![self.path.display().to_string(), "i".into()],
            )
        }
    }

    fn sample(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255])))
    }

    fn request(image: DynamicImage) -> ExecutionRequest {
        ExecutionRequest::new(image, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_passthrough_tool_returns_image() {
        let tool = FakeTool::new("test \"$1\" = i || exit 9\nexec cat");
        let out = tool.command().process(request(sample(3, 2))).await.unwrap();
        assert_eq!((out.width(), out.height()), (3, 2));
        assert_eq!(out.to_rgba8().get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_tool_failure() {
        let tool = FakeTool::new("cat >/dev/null\necho boom >&2\nexit 1");
        let err = tool.command().process(request(sample(2, 2))).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ExternalToolFailure);
        assert!(err.stderr().unwrap().contains("boom"));
        assert!(err.to_string().contains(&tool.path.display().to_string()));
    }

    #[tokio::test]
    async fn test_garbage_output_is_output_decode_failure() {
        let tool = FakeTool::new("cat >/dev/null\necho 'not a png'");
        let err = tool.command().process(request(sample(2, 2))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutputDecodeFailure);
    }

    #[tokio::test]
    async fn test_missing_tool_is_spawn_failure() {
        let cmd = RembgCommand::new("/nonexistent/rembg", vec!["i".into()]);
        let err = cmd.process(request(sample(1, 1))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolSpawnFailure);
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let tool = FakeTool::new("exec sleep 30");
        let cmd = tool.command().with_timeout(Some(Duration::from_millis(200)));
        let err = cmd.process(request(sample(1, 1))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolTimeout);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_cancel_leaves_no_process_behind() {
        let tool = FakeTool::new("echo $$ > \"$(dirname \"$0\")/pid\"\nexec sleep 30");
        let pid_file = tool.path.with_file_name("pid");

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let cmd = tool.command();
        let task = tokio::spawn(async move {
            cmd.process(ExecutionRequest::new(sample(1, 1), cancel)).await
        });

        let pid = loop {
            if let Ok(pid) = std::fs::read_to_string(&pid_file) {
                if !pid.trim().is_empty() {
                    break pid.trim().to_string();
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        };

        trigger.cancel();
        let err = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("cancellation should be prompt")
            .unwrap()
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(!std::path::Path::new(&format!("/proc/{}", pid)).exists());
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_isolated() {
        // Tiny encoded inputs get garbage back; anything larger passes through.
        let tool = FakeTool::new(
            "in=$(mktemp)\ncat > \"$in\"\nif [ \"$(wc -c < \"$in\")\" -gt 120 ]; then cat \"$in\"; else echo corrupt; fi\nrm -f \"$in\"",
        );
        let cmd = tool.command();

        let corrupt = cmd.process(request(sample(1, 1)));
        let valid = cmd.process(request(DynamicImage::ImageRgba8(RgbaImage::from_fn(
            64,
            64,
            |x, y| Rgba([x as u8, y as u8, (x ^ y) as u8, 255]),
        ))));
        let (corrupt, valid) = tokio::join!(corrupt, valid);

        assert_eq!(corrupt.unwrap_err().kind(), ErrorKind::OutputDecodeFailure);
        let valid = valid.unwrap();
        assert_eq!((valid.width(), valid.height()), (64, 64));
        assert_eq!(valid.to_rgba8().get_pixel(5, 9), &Rgba([5, 9, 12, 255]));
    }

    #[test]
    fn test_command_line() {
        let cmd = RembgCommand::new("/usr/local/bin/rembg", vec!["i".into()]);
        assert_eq!(cmd.command_line(), "/usr/local/bin/rembg i");
    }
}
