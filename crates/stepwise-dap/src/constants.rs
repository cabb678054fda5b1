//! DAP protocol constants

/// Event names received from debug adapters
pub mod events {
    pub const OUTPUT: &str = "output";
    pub const STOPPED: &str = "stopped";
    pub const CONTINUED: &str = "continued";
    /// Adapter is ready for configuration requests
    pub const INITIALIZED: &str = "initialized";
    /// Debug session ended
    pub const TERMINATED: &str = "terminated";
    /// Debuggee process exited
    pub const EXITED: &str = "exited";
    pub const THREAD: &str = "thread";
}

/// Request command names
pub mod requests {
    pub const INITIALIZE: &str = "initialize";
    pub const LAUNCH: &str = "launch";
    pub const ATTACH: &str = "attach";
    pub const SET_BREAKPOINTS: &str = "setBreakpoints";
    pub const CONFIGURATION_DONE: &str = "configurationDone";
    pub const THREADS: &str = "threads";
    pub const STACK_TRACE: &str = "stackTrace";
    pub const SCOPES: &str = "scopes";
    pub const VARIABLES: &str = "variables";
    pub const EVALUATE: &str = "evaluate";
    pub const CONTINUE: &str = "continue";
    pub const NEXT: &str = "next";
    pub const STEP_IN: &str = "stepIn";
    pub const STEP_OUT: &str = "stepOut";
    pub const PAUSE: &str = "pause";
    pub const DISCONNECT: &str = "disconnect";
    pub const TERMINATE: &str = "terminate";
}

/// Requests a backend sends to the client
pub mod reverse_requests {
    pub const RUN_IN_TERMINAL: &str = "runInTerminal";
    pub const START_DEBUGGING: &str = "startDebugging";
}

/// Stopped event reasons
pub mod stop_reasons {
    pub const BREAKPOINT: &str = "breakpoint";
    pub const STEP: &str = "step";
    pub const PAUSE: &str = "pause";
    pub const EXCEPTION: &str = "exception";
    pub const ENTRY: &str = "entry";
}

/// Output event categories
pub mod output_categories {
    pub const STDOUT: &str = "stdout";
    pub const STDERR: &str = "stderr";
    pub const CONSOLE: &str = "console";
    pub const TELEMETRY: &str = "telemetry";
}

/// Evaluate request contexts
pub mod evaluate_contexts {
    pub const REPL: &str = "repl";
    pub const WATCH: &str = "watch";
    pub const HOVER: &str = "hover";
}

pub mod defaults {
    /// Thread used when no thread id is known. Correct for single-threaded
    /// targets only.
    pub const THREAD_ID: i64 = 1;

    pub const CLIENT_ID: &str = "stepwise";
    pub const CLIENT_NAME: &str = "Stepwise";
}
