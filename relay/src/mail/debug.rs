use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use log::debug;

use crate::mail::{Fields, MailError, MailUsers, Sender, Template};

/// Writes rendered mail to a writer instead of sending it.
pub struct DebugSender {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl Default for DebugSender {
    fn default() -> Self {
        Self::new(io::stdout())
    }
}

impl DebugSender {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }
}

impl Sender for DebugSender {
    fn send_mail(
        &self,
        to: &MailUsers,
        template: &Template,
        data: &Fields,
    ) -> Result<(), MailError> {
        let body = template.render(data)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{body}")?;
        writer.flush()?;
        debug!("rendered mail {:?} for {to}", template.name);
        Ok(())
    }

    fn ping(&self) -> Result<(), MailError> {
        Ok(())
    }
}
