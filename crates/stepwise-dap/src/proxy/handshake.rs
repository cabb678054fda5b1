//! The initialize / launch / configure handshake.
//!
//! Backends disagree on when the launch response arrives, so the order is
//! taken from the policy. Breakpoint batches are applied between the ready
//! signal and `configurationDone`; each batch reports its own result and a
//! rejected batch does not fail the handshake.

use super::{Proxy, ProxyEvent, Readiness};
use crate::constants::requests;
use crate::policy::HandshakeOrder;
use crate::{
    Capabilities, DapBreakpoint, Error, InitializeRequestArguments, PendingResponse, Result,
    SetBreakpointsArguments, StoppedEventBody,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

/// What the handshake should launch and configure
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakePlan {
    /// `launch` or `attach`
    pub launch_command: String,
    pub launch_args: serde_json::Value,
    /// One batch per file
    pub breakpoints: Vec<SetBreakpointsArguments>,
}

impl HandshakePlan {
    pub fn launch(launch_args: serde_json::Value) -> Self {
        Self {
            launch_command: requests::LAUNCH.to_string(),
            launch_args,
            breakpoints: Vec::new(),
        }
    }

    pub fn with_breakpoints(mut self, breakpoints: Vec<SetBreakpointsArguments>) -> Self {
        self.breakpoints = breakpoints;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakpointBatchResult {
    pub path: String,
    pub result: Result<Vec<DapBreakpoint>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeOutcome {
    pub capabilities: Capabilities,
    pub breakpoint_results: Vec<BreakpointBatchResult>,
    /// First stop reported while the handshake ran
    pub initial_stop: Option<StoppedEventBody>,
}

impl Proxy {
    /// Run the handshake against a started proxy
    #[instrument(skip(self, plan), fields(backend = self.policy.name(), command = %plan.launch_command))]
    pub async fn handshake(self: &Arc<Self>, plan: HandshakePlan) -> Result<HandshakeOutcome> {
        let mut events = self.subscribe();
        let broker = self.live_broker().await?;

        let init = InitializeRequestArguments::for_adapter(self.policy.adapter_id());
        let capabilities: Capabilities = broker
            .send_request(requests::INITIALIZE, Some(serde_json::to_value(&init)?))
            .await
            .and_then(|response| response.into_success())
            .and_then(|response| response.body_as())
            .map_err(|e| Error::InitializationFailed(e.to_string()))?;
        *self.capabilities.lock().await = Some(capabilities.clone());
        debug!("Backend initialized");

        let breakpoint_results = match self.policy.handshake_order() {
            HandshakeOrder::DeferredLaunchResponse => {
                let launch = self.dispatch_launch(&plan).await?;
                let mut launch_wait = Box::pin(launch.wait());
                tokio::select! {
                    ready = self.wait_ready() => ready?,
                    early = &mut launch_wait => {
                        // Answered before configuration: only a failure matters
                        early?.into_success()?;
                        self.wait_ready().await?;
                        let results = self.configure(&plan, &capabilities).await?;
                        info!("Handshake complete");
                        return Ok(HandshakeOutcome {
                            capabilities,
                            breakpoint_results: results,
                            initial_stop: first_stop(&mut events),
                        });
                    }
                }
                let results = self.configure(&plan, &capabilities).await?;
                launch_wait.await?.into_success()?;
                results
            }
            HandshakeOrder::LaunchThenConfigure => {
                self.dispatch_launch(&plan).await?.wait().await?.into_success()?;
                self.wait_ready().await?;
                self.configure(&plan, &capabilities).await?
            }
        };

        info!("Handshake complete");
        Ok(HandshakeOutcome {
            capabilities,
            breakpoint_results,
            initial_stop: first_stop(&mut events),
        })
    }

    async fn dispatch_launch(&self, plan: &HandshakePlan) -> Result<PendingResponse> {
        {
            let mut state = self.adapter_state.lock().await;
            self.policy
                .update_state_on_command(&plan.launch_command, &mut state);
        }
        let broker = self.live_broker().await?;
        broker
            .dispatch(&plan.launch_command, Some(plan.launch_args.clone()))
            .await
    }

    /// Apply breakpoint batches, then `configurationDone`
    async fn configure(
        &self,
        plan: &HandshakePlan,
        capabilities: &Capabilities,
    ) -> Result<Vec<BreakpointBatchResult>> {
        let mut results = Vec::with_capacity(plan.breakpoints.len());
        for batch in &plan.breakpoints {
            let path = batch.source.path.clone().unwrap_or_default();
            let result = self.set_breakpoints(batch).await;
            if let Err(e) = &result {
                debug!(path = %path, "Breakpoint batch rejected: {}", e);
            }
            results.push(BreakpointBatchResult { path, result });
        }

        if capabilities.supports_configuration_done_request != Some(false) {
            self.send_request(requests::CONFIGURATION_DONE, None)
                .await?
                .into_success()?;
        }
        Ok(results)
    }

    /// Wait for the ready signal, bounded by the ready timeout
    pub(crate) async fn wait_ready(&self) -> Result<()> {
        let mut readiness = self.readiness.subscribe();
        let timeout = Duration::from_millis(self.config.ready_timeout_ms);
        let outcome = tokio::time::timeout(timeout, async {
            readiness
                .wait_for(|r| *r != Readiness::Pending)
                .await
                .map(|r| *r)
        })
        .await;
        match outcome {
            Ok(Ok(Readiness::Ready)) => Ok(()),
            Ok(_) => Err(Error::Communication(
                "Backend closed before it was ready".to_string(),
            )),
            Err(_) => Err(Error::Timeout(self.config.ready_timeout_ms)),
        }
    }
}

fn first_stop(events: &mut broadcast::Receiver<ProxyEvent>) -> Option<StoppedEventBody> {
    loop {
        match events.try_recv() {
            Ok(ProxyEvent::Stopped(body)) => return Some(body),
            Ok(_) => continue,
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return None,
        }
    }
}
