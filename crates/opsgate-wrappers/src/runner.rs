//! Wrapper execution.

use opsgate_audit::{AuditKind, AuditLog};
use opsgate_validate::FORBIDDEN_CHARS;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Semaphore;
use zeroize::Zeroizing;

use crate::error::{GatewayError, GatewayResult};
use crate::registry::{WrapperRegistry, WrapperSpec};
use crate::result::{FailureReason, WrapperResult};

/// Maximum stderr characters carried into audit details.
const STDERR_SNIPPET_LEN: usize = 500;

/// Runtime limits for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayLimits {
    /// Global cap on concurrently running children.
    pub max_concurrency: usize,
    /// How long a run may wait for a concurrency permit before it is
    /// refused as overloaded.
    pub queue_timeout: Duration,
    /// Prefixes a normalized path argument must stay inside.
    pub allowed_path_prefixes: Vec<PathBuf>,
}

impl Default for GatewayLimits {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
            queue_timeout: Duration::from_secs(2),
            allowed_path_prefixes: vec![
                PathBuf::from("/home"),
                PathBuf::from("/usr/local/sbin"),
                PathBuf::from("/usr/bin"),
                PathBuf::from("/usr/sbin"),
                PathBuf::from("/bin"),
                PathBuf::from("/etc/cron.d"),
            ],
        }
    }
}

/// Replace forbidden characters so wrapper output can enter log
/// records. Newlines and tabs flatten to spaces; everything else in
/// the forbidden set becomes `_`.
#[must_use]
pub fn scrub(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' | ' ' => ' ',
            c if FORBIDDEN_CHARS.contains(&c) => '_',
            c => c,
        })
        .collect()
}

/// Executes registered wrappers under the gateway's guarantees.
pub struct WrapperRunner {
    registry: Arc<WrapperRegistry>,
    limits: GatewayLimits,
    semaphore: Arc<Semaphore>,
    audit: AuditLog,
}

impl WrapperRunner {
    /// Create a runner.
    #[must_use]
    pub fn new(registry: Arc<WrapperRegistry>, limits: GatewayLimits, audit: AuditLog) -> Self {
        let semaphore = Arc::new(Semaphore::new(limits.max_concurrency.max(1)));
        Self {
            registry,
            limits,
            semaphore,
            audit,
        }
    }

    /// The registry this runner resolves wrappers from.
    #[must_use]
    pub fn registry(&self) -> &WrapperRegistry {
        &self.registry
    }

    /// Run a wrapper with pre-validated arguments.
    ///
    /// `stdin`, when present, is written to the child's standard input
    /// and zeroized on return; it never appears in `argv`, audit
    /// records, or errors.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] for pre-spawn rejections (unknown
    /// wrapper, arity, argument screen, path allowlist, audit
    /// failure). Wrapper-level failures are reported inside the
    /// returned [`WrapperResult`].
    pub async fn run(
        &self,
        actor: &str,
        wrapper_id: &str,
        argv: Vec<String>,
        stdin: Option<Zeroizing<Vec<u8>>>,
    ) -> GatewayResult<WrapperResult> {
        let spec = self
            .registry
            .resolve(wrapper_id)
            .ok_or_else(|| GatewayError::UnknownWrapper(wrapper_id.to_string()))?;

        self.revalidate(spec, &argv).await?;

        let argv_lengths: Vec<usize> = argv.iter().map(String::len).collect();
        self.audit
            .record(
                AuditKind::Attempt,
                actor,
                wrapper_id,
                "spawning",
                Some(serde_json::json!({
                    "wrapper_id": wrapper_id,
                    "argv_len": argv.len(),
                    "argv_lengths": argv_lengths,
                })),
            )
            .await?;

        let result = self.spawn_and_wait(spec, argv, stdin).await;

        let (kind, outcome) = match result.failure {
            None => (AuditKind::Success, "ok".to_string()),
            Some(reason) => (AuditKind::Failure, reason.as_str().to_string()),
        };
        self.audit
            .record(
                kind,
                actor,
                wrapper_id,
                outcome,
                Some(serde_json::json!({
                    "wrapper_id": wrapper_id,
                    "exit_code": result.exit_code,
                    "duration_ms": result.duration_ms,
                    "stderr": truncate(&result.stderr, STDERR_SNIPPET_LEN),
                })),
            )
            .await?;

        Ok(result)
    }

    /// Re-validate arguments immediately before spawn.
    async fn revalidate(&self, spec: &WrapperSpec, argv: &[String]) -> GatewayResult<()> {
        if argv.len() < spec.min_args {
            return Err(GatewayError::TooFewArguments {
                wrapper: spec.id.clone(),
                min_args: spec.min_args,
                got: argv.len(),
            });
        }
        for arg in argv {
            if arg.is_empty() {
                return Err(GatewayError::InvalidArgument("empty argument".to_string()));
            }
            if let Some(ch) = arg
                .chars()
                .find(|c| FORBIDDEN_CHARS.contains(c) && !spec.allow_chars.contains(c))
            {
                return Err(GatewayError::InvalidArgument(format!(
                    "argument carries forbidden character {ch:?}"
                )));
            }
            // `--key=value` or bare value; a value rooted at `/` is a
            // path and must survive normalization inside the allowlist.
            let value = arg.split_once('=').map_or(arg.as_str(), |(_, v)| v);
            if value.starts_with('/') {
                let normalized = normalize_path(Path::new(value)).await?;
                if !self
                    .limits
                    .allowed_path_prefixes
                    .iter()
                    .any(|prefix| normalized.starts_with(prefix))
                {
                    return Err(GatewayError::PathNotAllowed(
                        normalized.display().to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    async fn spawn_and_wait(
        &self,
        spec: &WrapperSpec,
        argv: Vec<String>,
        stdin: Option<Zeroizing<Vec<u8>>>,
    ) -> WrapperResult {
        let base = |failure: Option<FailureReason>| WrapperResult {
            wrapper_id: spec.id.clone(),
            exit_code: -1,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 0,
            json: None,
            failure,
        };

        // Global concurrency cap with a bounded queue.
        let permit = match tokio::time::timeout(
            self.limits.queue_timeout,
            Arc::clone(&self.semaphore).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) | Err(_) => {
                return base(Some(FailureReason::Overloaded));
            },
        };
        let _permit = permit;

        let mut command = Command::new(&spec.path);
        command
            .args(&argv)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(wrapper = %spec.id, error = %e, "wrapper spawn failed");
                let mut result = base(Some(FailureReason::Spawn));
                result.stderr = scrub(&e.to_string());
                return result;
            },
        };

        // The secret lives only in this frame; Zeroizing wipes it on
        // drop whether or not the write succeeds.
        if let Some(secret) = stdin {
            if let Some(mut handle) = child.stdin.take() {
                if let Err(e) = handle.write_all(&secret).await {
                    tracing::warn!(wrapper = %spec.id, error = %e, "stdin write failed");
                }
                let _ = handle.shutdown().await;
            }
        }

        let output = match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                let mut result = base(Some(FailureReason::Spawn));
                result.stderr = scrub(&e.to_string());
                result.duration_ms = elapsed_ms(started);
                return result;
            },
            Err(_elapsed) => {
                // Dropping the wait future kills the child
                // (kill_on_drop).
                let mut result = base(Some(FailureReason::Timeout));
                result.duration_ms = elapsed_ms(started);
                return result;
            },
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = scrub(&String::from_utf8_lossy(&output.stderr));
        let duration_ms = elapsed_ms(started);

        let json = serde_json::from_str::<serde_json::Value>(stdout.trim())
            .ok()
            .filter(serde_json::Value::is_object);

        let failure = if exit_code != 0 {
            Some(FailureReason::NonZeroExit)
        } else if json.is_none() {
            Some(FailureReason::Protocol)
        } else {
            None
        };

        WrapperResult {
            wrapper_id: spec.id.clone(),
            exit_code,
            stdout,
            stderr,
            duration_ms,
            json,
            failure,
        }
    }
}

impl std::fmt::Debug for WrapperRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrapperRunner")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Normalize a path argument for the allowlist check.
///
/// `..` components are rejected outright. If the path (or its parent)
/// exists, symlinks are resolved via `canonicalize`; a path that does
/// not exist yet cannot be a symlink and passes through lexically.
async fn normalize_path(path: &Path) -> GatewayResult<PathBuf> {
    if path
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(GatewayError::PathNotAllowed(format!(
            "{} contains a parent traversal",
            path.display()
        )));
    }

    if let Ok(canonical) = tokio::fs::canonicalize(path).await {
        return Ok(canonical);
    }
    if let (Some(parent), Some(file_name)) = (path.parent(), path.file_name()) {
        if let Ok(canonical_parent) = tokio::fs::canonicalize(parent).await {
            return Ok(canonical_parent.join(file_name));
        }
    }
    Ok(path.to_path_buf())
}
