use std::collections::HashMap;

use crate::envd::process::ProcessInfoMessage;

/// Outcome of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Error message reported by envd, empty on clean exit.
    pub error: String,
}

/// A process running in the sandbox.
#[derive(Debug, Clone, Default)]
pub struct ProcessInfo {
    pub pid: u32,
    /// Custom tag, e.g. marking a template start command.
    pub tag: String,
    pub cmd: String,
    pub args: Vec<String>,
    pub envs: HashMap<String, String>,
    pub cwd: String,
}

impl From<ProcessInfoMessage> for ProcessInfo {
    fn from(message: ProcessInfoMessage) -> Self {
        let config = message.config.unwrap_or_else(|| {
            crate::envd::process::ProcessConfig {
                cmd: String::new(),
                args: Vec::new(),
                envs: HashMap::new(),
                cwd: None,
            }
        });
        ProcessInfo {
            pid: message.pid,
            tag: message.tag.unwrap_or_default(),
            cmd: config.cmd,
            args: config.args,
            envs: config.envs,
            cwd: config.cwd.unwrap_or_default(),
        }
    }
}
