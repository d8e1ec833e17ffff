//! Per-run agent state: the account name requests are signed as, and the
//! operator's consent to disclose this host's public IP.
//!
//! Publishing a challenge tells the target server which IP asked for it, so
//! the agent refuses to send anything until the operator has agreed, either
//! up front via a flag or through an interactive prompt. The answer is asked
//! for at most once per run.

use std::io;

use crate::error::AgentError;

/// Prompt shown before the first outbound request of a run.
const CONSENT_PROMPT: &str = "Sending challenges to the server will disclose \
this machine's public IP address to it. Continue?";

/// Callback used to ask the operator a yes/no question.
pub type ConsentPrompt = Box<dyn FnMut(&str) -> io::Result<bool> + Send>;

pub struct Session {
    username: String,
    non_interactive: bool,
    consent_granted: bool,
    prompt: ConsentPrompt,
}

impl Session {
    /// Open a session for the named account.
    ///
    /// `consent_pregranted` records a flag-level grant (`--public-ip-logging-ok`);
    /// without it, the first outbound request triggers `prompt`, except in
    /// non-interactive mode where the request is refused instead.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the username is blank.
    pub fn new(
        username: impl Into<String>,
        consent_pregranted: bool,
        non_interactive: bool,
        prompt: ConsentPrompt,
    ) -> Result<Self, AgentError> {
        let username = username.into();
        if username.trim().is_empty() {
            return Err(AgentError::InvalidConfig(
                "username must not be blank (set --username)".into(),
            ));
        }
        Ok(Self {
            username,
            non_interactive,
            consent_granted: consent_pregranted,
            prompt,
        })
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Whether consent has already been granted this run.
    #[must_use]
    pub fn consent_granted(&self) -> bool {
        self.consent_granted
    }

    /// Obtain consent to disclose this host's IP, prompting if needed.
    ///
    /// Must succeed before any request leaves the agent. A granted answer is
    /// cached for the rest of the run; a declined prompt, a prompt that
    /// cannot be read, or non-interactive mode without a prior grant all
    /// fail with `ConsentDenied`.
    pub fn confirm_ip_disclosure(&mut self) -> Result<(), AgentError> {
        if self.consent_granted {
            return Ok(());
        }
        if self.non_interactive {
            return Err(AgentError::ConsentDenied);
        }
        match (self.prompt)(CONSENT_PROMPT) {
            Ok(true) => {
                self.consent_granted = true;
                Ok(())
            }
            Ok(false) | Err(_) => Err(AgentError::ConsentDenied),
        }
    }
}
