//! set_breakpoint with per-file batch replacement

use crate::managed::ManagedSession;
use crate::manager::{payload, SessionManager};
use stepwise_core::{
    Breakpoint, BreakpointId, DebugSession, Error, ExecutionState, OpResult, Result, SessionId,
};
use stepwise_dap::{DapBreakpoint, Proxy, SetBreakpointsArguments, SourceBreakpoint};
use tracing::{debug, instrument};

const MISSING_ENTRY: &str = "debugger returned no result for this breakpoint";

impl SessionManager {
    /// Add a breakpoint. Once the debugger is configured the file's whole set
    /// is sent in one batch and every entry is re-evaluated from the
    /// response; before that the breakpoint is stored unverified and flushed
    /// by start.
    #[instrument(skip(self, condition), fields(session = %id))]
    pub async fn set_breakpoint(
        &self,
        id: &SessionId,
        file: &str,
        line: u32,
        condition: Option<String>,
    ) -> Result<OpResult<Breakpoint>> {
        let (managed, _) = self.live(id).await?;
        if file.trim().is_empty() {
            return Ok(payload(
                "set_breakpoint",
                id,
                Err(Error::InvalidArgument("file must not be empty".to_string())),
            ));
        }
        if line == 0 {
            return Ok(payload(
                "set_breakpoint",
                id,
                Err(Error::InvalidArgument("line must be >= 1".to_string())),
            ));
        }

        let file_lock = managed.file_lock(file);
        let _guard = file_lock.lock().await;

        let (breakpoint, configured) = {
            let mut session = managed.session.lock().await;
            if session.is_terminated() {
                return Err(Error::SessionTerminated(id.to_string()));
            }
            let breakpoint = session.add_breakpoint(file, line, condition);
            (breakpoint, is_configured(&session))
        };
        if !configured {
            debug!(file, line, "Breakpoint queued until the debugger is configured");
            return Ok(OpResult::ok(breakpoint));
        }

        let result = match managed.proxy().await {
            Some(proxy) => sync_file(&managed, &proxy, file).await,
            None => Err(stepwise_dap::Error::NotRunning(format!(
                "session {} has no debugger",
                id
            ))),
        };

        let mut session = managed.session.lock().await;
        let result = match result {
            Ok(()) => session
                .breakpoints
                .get(&breakpoint.id)
                .cloned()
                .ok_or_else(|| Error::Internal("breakpoint vanished".to_string())),
            Err(e) => {
                session.remove_breakpoint(&breakpoint.id);
                Err(match e {
                    stepwise_dap::Error::RequestFailed { message, .. }
                        if breakpoint.has_condition() =>
                    {
                        Error::ConditionSyntaxInvalid(message)
                    }
                    other => other.into(),
                })
            }
        };
        Ok(payload("set_breakpoint", id, result))
    }
}

/// Active and past the handshake. Breakpoints added earlier are queued.
fn is_configured(session: &DebugSession) -> bool {
    session.is_active() && session.execution_state() != Some(ExecutionState::Initializing)
}

/// Send the current set for `file` and apply the response. The caller holds
/// the file lock.
pub(crate) async fn sync_file(
    managed: &ManagedSession,
    proxy: &Proxy,
    file: &str,
) -> stepwise_dap::Result<()> {
    let batch = managed.session.lock().await.breakpoints_for_file(file);
    let args = SetBreakpointsArguments::for_file(
        file,
        batch
            .iter()
            .map(|bp| SourceBreakpoint::at_line(bp.line).with_condition(bp.condition.clone()))
            .collect(),
    );
    let entries = proxy.set_breakpoints(&args).await?;

    let mut session = managed.session.lock().await;
    apply_entries(&mut session, batch.iter().map(|bp| &bp.id), entries);
    Ok(())
}

/// Apply a setBreakpoints response positionally. Breakpoints without a
/// matching entry become unverified.
pub(crate) fn apply_entries<'a>(
    session: &mut DebugSession,
    ids: impl IntoIterator<Item = &'a BreakpointId>,
    entries: Vec<DapBreakpoint>,
) {
    let mut entries = entries.into_iter();
    for id in ids {
        let entry = entries.next();
        let Some(stored) = session.breakpoints.get_mut(id) else {
            continue;
        };
        match entry {
            Some(entry) => stored.apply_backend_result(entry.verified, entry.message),
            None => {
                stored.mark_unverified();
                stored.message = Some(MISSING_ENTRY.to_string());
            }
        }
    }
    session.touch();
}
