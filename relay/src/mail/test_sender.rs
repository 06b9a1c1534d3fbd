use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::debug;

use crate::chans::{Broadcaster, Subscription, Waiter};
use crate::mail::{Fields, MailError, MailUsers, Sender, Template};

/// A mail recorded by [`TestSender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestMail {
    pub to: Vec<String>,
    pub template: String,
    pub data: Fields,
}

/// Records mail instead of sending it.
///
/// Every mail is recorded before [`send_mail`](Sender::send_mail) returns, then
/// published on an internal broadcaster that tests may subscribe to:
///
/// ```rust,ignore
/// let sender = TestSender::new();
/// let waiter = sender.wait_for(|mail| mail.to.contains(&"ada@example.com".into()), timeout);
///
/// signup(&sender, "ada@example.com");
///
/// let mail = waiter.wait().expect("no welcome mail");
/// ```
pub struct TestSender {
    broadcaster: Broadcaster<TestMail>,
    sent: Mutex<Vec<TestMail>>,
}

impl Default for TestSender {
    fn default() -> Self {
        Self::new()
    }
}

impl TestSender {
    pub fn new() -> Self {
        Self {
            broadcaster: Broadcaster::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    fn sent(&self) -> MutexGuard<'_, Vec<TestMail>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a subscriber receiving every mail sent from now on.
    pub fn subscribe(&self) -> Subscription<TestMail> {
        self.broadcaster.register()
    }

    /// The broadcaster mails are published on.
    pub fn broadcaster(&self) -> &Broadcaster<TestMail> {
        &self.broadcaster
    }

    /// Every mail sent so far, in send order.
    pub fn mails(&self) -> Vec<TestMail> {
        self.sent().clone()
    }

    /// First sent mail matching `predicate`.
    pub fn find_test_mail<P>(&self, mut predicate: P) -> Option<TestMail>
    where
        P: FnMut(&TestMail) -> bool,
    {
        self.sent().iter().find(|mail| predicate(mail)).cloned()
    }

    /// Wait for a mail sent after this call that matches `predicate`.
    pub fn wait_for<P>(&self, predicate: P, timeout: Duration) -> Waiter<TestMail>
    where
        P: FnMut(&TestMail) -> bool + Send + 'static,
    {
        self.broadcaster.wait_for(predicate, timeout)
    }
}

impl Sender for TestSender {
    fn send_mail(
        &self,
        to: &MailUsers,
        template: &Template,
        data: &Fields,
    ) -> Result<(), MailError> {
        let mail = TestMail {
            to: to.emails(),
            template: template.name.clone(),
            data: data.clone(),
        };
        self.sent().push(mail.clone());
        let subscribers = self.broadcaster.send(mail);
        debug!(
            "recorded test mail {:?} for {to} ({subscribers} subscribers)",
            template.name
        );
        Ok(())
    }

    fn ping(&self) -> Result<(), MailError> {
        Err(MailError::TestSender)
    }
}
