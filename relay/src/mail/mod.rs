//! Outbound mail abstraction and its non-production senders.
//!
//! [`Sender`] is the seam code depends on to send templated mail. This module ships
//! two implementations that never touch the network:
//!
//! - [`DebugSender`]: renders the mail and writes it to a writer (stdout by default).
//! - [`TestSender`]: records every mail and publishes it on a
//!   [`Broadcaster`](crate::chans::Broadcaster), so tests can wait for a specific mail
//!   instead of sleeping.

mod debug;
mod test_sender;

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

pub use debug::DebugSender;
pub use test_sender::{TestMail, TestSender};

/// Template data: placeholder name to substituted text.
pub type Fields = BTreeMap<String, String>;

/// Errors produced by mail senders.
#[derive(Error, Debug)]
pub enum MailError {
    /// The template references a placeholder missing from the data.
    #[error("template {template:?} references unknown field {field:?}")]
    MissingField { template: String, field: String },

    /// A `{{` placeholder is never closed.
    #[error("template {template:?} has an unterminated placeholder")]
    Unterminated { template: String },

    /// Writing the rendered mail failed.
    #[error("writing mail: {0}")]
    Io(#[from] std::io::Error),

    /// [`TestSender::ping`] always fails so a test double wired into a real
    /// environment is noticed.
    #[error("pinging test sender: make sure this is not a misconfiguration")]
    TestSender,
}

/// A mail recipient.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MailUser {
    pub name: String,
    pub email: String,
}

impl MailUser {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl fmt::Display for MailUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// A list of recipients.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MailUsers(pub Vec<MailUser>);

impl MailUsers {
    /// Bare addresses of every recipient.
    pub fn emails(&self) -> Vec<String> {
        self.0.iter().map(|user| user.email.clone()).collect()
    }
}

impl fmt::Display for MailUsers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, user) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{user}")?;
        }
        Ok(())
    }
}

impl From<Vec<MailUser>> for MailUsers {
    fn from(users: Vec<MailUser>) -> Self {
        Self(users)
    }
}

/// A named mail body with `{{field}}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub body: String,
}

impl Template {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }

    /// Substitute every placeholder with its value from `data`.
    ///
    /// Whitespace inside the braces is ignored, so `{{ name }}` and `{{name}}` are
    /// the same placeholder.
    pub fn render(&self, data: &Fields) -> Result<String, MailError> {
        let mut out = String::with_capacity(self.body.len());
        let mut rest = self.body.as_str();

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| MailError::Unterminated {
                template: self.name.clone(),
            })?;
            let field = after[..end].trim();
            let value = data.get(field).ok_or_else(|| MailError::MissingField {
                template: self.name.clone(),
                field: field.to_string(),
            })?;
            out.push_str(value);
            rest = &after[end + 2..];
        }
        out.push_str(rest);

        Ok(out)
    }
}

/// Sends templated mail.
pub trait Sender: Send + Sync {
    /// Render `template` with `data` and send it to `to`.
    fn send_mail(&self, to: &MailUsers, template: &Template, data: &Fields)
    -> Result<(), MailError>;

    /// Check that the sender is usable.
    fn ping(&self) -> Result<(), MailError>;
}
