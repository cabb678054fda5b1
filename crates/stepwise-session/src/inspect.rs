//! Inspection of a paused session, plus source context lookup

use crate::manager::{payload, SessionManager};
use std::path::Path;
use stepwise_core::{
    Error, EvaluationResult, LocalVariables, OpResult, Result, Scope, SessionId, SourceContext,
    SourceLine, StackFrame, Variable,
};
use stepwise_dap::constants::evaluate_contexts;
use stepwise_dap::{DapScope, DapStackFrame, DapVariable, EvaluateArguments, Proxy};
use tracing::instrument;

fn to_frame(frame: DapStackFrame) -> StackFrame {
    StackFrame {
        id: frame.id,
        file: frame.source_path().map(str::to_string),
        name: frame.name,
        line: frame.line,
        column: (frame.column > 0).then_some(frame.column),
    }
}

fn to_scope(scope: DapScope) -> Scope {
    Scope {
        name: scope.name,
        variables_reference: scope.variables_reference,
        expensive: scope.expensive,
    }
}

fn to_variable(variable: DapVariable) -> Variable {
    let converted =
        Variable::new(variable.name, variable.value).with_reference(variable.variables_reference);
    match variable.var_type {
        Some(type_name) => converted.with_type(type_name),
        None => converted,
    }
}

/// Thread of the current stop: the cached one, else the first listed
async fn stopped_thread(proxy: &Proxy) -> Result<i64> {
    if let Some(thread_id) = proxy.current_thread_id().await {
        return Ok(thread_id);
    }
    let threads = proxy.threads().await?;
    threads
        .first()
        .map(|thread| thread.id)
        .ok_or_else(|| Error::DebuggerError("backend reported no threads".to_string()))
}

impl SessionManager {
    /// Frames of the stopped thread; empty unless Paused
    #[instrument(skip(self), fields(session = %id))]
    pub async fn get_stack_trace(
        &self,
        id: &SessionId,
        include_internals: bool,
    ) -> Result<OpResult<Vec<StackFrame>>> {
        let (managed, snapshot) = self.live(id).await?;
        if !snapshot.is_paused() {
            return Ok(OpResult::ok(Vec::new()));
        }
        let result: Result<Vec<StackFrame>> = async {
            let proxy = managed.running_proxy().await?;
            let thread_id = stopped_thread(&proxy).await?;
            let frames = proxy
                .stack_trace(thread_id, self.session_config.max_stack_frames)
                .await?;
            let policy = proxy.policy();
            Ok(frames
                .into_iter()
                .filter(|frame| include_internals || !policy.is_internal_frame(frame))
                .map(to_frame)
                .collect())
        }
        .await;
        Ok(payload("get_stack_trace", id, result))
    }

    /// Scopes of one frame; empty unless Paused
    #[instrument(skip(self), fields(session = %id))]
    pub async fn get_scopes(&self, id: &SessionId, frame_id: i64) -> Result<OpResult<Vec<Scope>>> {
        let (managed, snapshot) = self.live(id).await?;
        if !snapshot.is_paused() {
            return Ok(OpResult::ok(Vec::new()));
        }
        let result: Result<Vec<Scope>> = async {
            let proxy = managed.running_proxy().await?;
            let scopes = proxy.scopes(frame_id).await?;
            Ok(scopes.into_iter().map(to_scope).collect())
        }
        .await;
        Ok(payload("get_scopes", id, result))
    }

    /// Children of a variables reference; empty unless Paused
    #[instrument(skip(self), fields(session = %id))]
    pub async fn get_variables(
        &self,
        id: &SessionId,
        variables_reference: i64,
    ) -> Result<OpResult<Vec<Variable>>> {
        let (managed, snapshot) = self.live(id).await?;
        if !snapshot.is_paused() {
            return Ok(OpResult::ok(Vec::new()));
        }
        let result: Result<Vec<Variable>> = async {
            let proxy = managed.running_proxy().await?;
            let variables = proxy.variables(variables_reference).await?;
            Ok(variables.into_iter().map(to_variable).collect())
        }
        .await;
        Ok(payload("get_variables", id, result))
    }

    /// Locals of the top frame, filtered by the backend policy
    #[instrument(skip(self), fields(session = %id))]
    pub async fn get_local_variables(
        &self,
        id: &SessionId,
        include_special: bool,
    ) -> Result<OpResult<LocalVariables>> {
        let (managed, snapshot) = self.live(id).await?;
        if !snapshot.is_paused() {
            return Ok(OpResult::ok(LocalVariables::empty()));
        }
        let result: Result<LocalVariables> = async {
            let proxy = managed.running_proxy().await?;
            let thread_id = stopped_thread(&proxy).await?;
            let frames = proxy.stack_trace(thread_id, 1).await?;
            let Some(top) = frames.first().cloned() else {
                return Ok(LocalVariables::empty());
            };
            let scopes = proxy.scopes(top.id).await?;
            let policy = proxy.policy().clone();
            let Some(scope) = policy.find_local_scope(&scopes).cloned() else {
                return Ok(LocalVariables {
                    frame: Some(to_frame(top)),
                    scope_name: None,
                    variables: Vec::new(),
                });
            };
            let variables = proxy.variables(scope.variables_reference).await?;
            let locals =
                policy.extract_local_variables(&frames, &scopes, &variables, include_special);
            Ok(LocalVariables {
                frame: Some(to_frame(top)),
                scope_name: Some(scope.name),
                variables: locals.into_iter().map(to_variable).collect(),
            })
        }
        .await;
        Ok(payload("get_local_variables", id, result))
    }

    /// Evaluate in the REPL context of `frame_id`, or the top frame
    #[instrument(skip(self, expression), fields(session = %id))]
    pub async fn evaluate_expression(
        &self,
        id: &SessionId,
        expression: &str,
        frame_id: Option<i64>,
    ) -> Result<OpResult<EvaluationResult>> {
        let (managed, snapshot) = self.live(id).await?;
        let result: Result<EvaluationResult> = async {
            if expression.trim().is_empty() {
                return Err(Error::InvalidArgument("expression must not be empty".to_string()));
            }
            if !snapshot.is_paused() {
                return Err(Error::NotPaused(snapshot.id.to_string()));
            }
            let proxy = managed.running_proxy().await?;
            let frame_id = match frame_id {
                Some(frame_id) => frame_id,
                None => {
                    let thread_id = stopped_thread(&proxy).await?;
                    proxy
                        .stack_trace(thread_id, 1)
                        .await?
                        .first()
                        .map(|frame| frame.id)
                        .ok_or_else(|| Error::DebuggerError("no stack frames".to_string()))?
                }
            };
            let body = proxy
                .evaluate(&EvaluateArguments {
                    expression: expression.to_string(),
                    frame_id: Some(frame_id),
                    context: Some(evaluate_contexts::REPL.to_string()),
                })
                .await?;
            Ok(EvaluationResult {
                expression: expression.to_string(),
                result: body.result,
                type_name: body.result_type,
                variables_reference: body.variables_reference,
                frame_id,
            })
        }
        .await;
        Ok(payload("evaluate_expression", id, result))
    }

    /// Numbered source lines within `lines_around` of `line`
    pub async fn get_source_context(
        &self,
        id: &SessionId,
        file: &str,
        line: u32,
        lines_around: u32,
    ) -> Result<OpResult<SourceContext>> {
        self.entry(id)?;
        Ok(payload(
            "get_source_context",
            id,
            read_source_context(Path::new(file), line, lines_around).await,
        ))
    }
}

async fn read_source_context(file: &Path, line: u32, lines_around: u32) -> Result<SourceContext> {
    if line == 0 {
        return Err(Error::InvalidArgument("line must be >= 1".to_string()));
    }
    let text = tokio::fs::read_to_string(file).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::TargetNotFound(file.display().to_string())
        } else {
            Error::from(e)
        }
    })?;
    let total = u32::try_from(text.lines().count()).unwrap_or(u32::MAX);
    if line > total {
        return Err(Error::InvalidArgument(format!(
            "line {} is past the end of {} ({} lines)",
            line,
            file.display(),
            total
        )));
    }
    let first = line.saturating_sub(lines_around).max(1);
    let last = line.saturating_add(lines_around).min(total);
    let lines = text
        .lines()
        .zip(1u32..)
        .skip_while(|(_, number)| *number < first)
        .take_while(|(_, number)| *number <= last)
        .map(|(text, number)| SourceLine {
            number,
            text: text.to_string(),
            current: number == line,
        })
        .collect();
    Ok(SourceContext {
        file: file.display().to_string(),
        line,
        lines,
    })
}
