//! Operation-complete polling
//!
//! Some instrument commands take a long and unpredictable time to execute. Rather than picking a
//! response timeout long enough for the slowest of them, a write is followed by repeated `*OPC?`
//! queries until the device answers `1`. A poll that times out only means the device is still
//! busy; the reply it owes us is then awaited again instead of asking a second time. When the
//! policy gives up with a reply still owed, the channel skips that reply once it arrives, so a late
//! `1` is never taken as the answer to a later query.

use std::time::Duration;
use async_trait::async_trait;
use log::debug;
use tokio::time::Instant;
use crate::error::{ Error, Result };

pub const OPC_QUERY: &str = "*OPC?";

/// Where the poll loop is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState
{
    /// The command is written and no poll has been issued yet
    Sent,
    /// At least one poll was issued and the device has not reported done
    Polling,
    /// The device answered `1`
    Complete,
}

/// Bounds on the poll loop
///
/// With both `max_attempts` and `max_duration` unset the loop only ends when the device reports
/// done or the channel faults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy
{
    pub max_attempts: Option<u32>,
    pub max_duration: Option<Duration>,
    /// Pause between a "not done" answer and the next poll
    pub interval: Duration,
}

impl Default for PollPolicy
{
    fn default() -> Self
    {
        Self {
            max_attempts: Some(600),
            max_duration: Some(Duration::from_secs(300)),
            interval: Duration::from_millis(50),
        }
    }
}

impl PollPolicy
{
    pub fn unbounded() -> Self
    {
        Self {
            max_attempts: None,
            max_duration: None,
            ..Self::default()
        }
    }

    fn exhausted(&self, attempts: u32, started: Instant) -> bool
    {
        self.max_attempts.map_or(false, |max| attempts >= max)
            || self.max_duration.map_or(false, |max| started.elapsed() >= max)
    }
}

/// A channel that can be asked for its operation-complete status
///
/// The request and the reply are separate so the poll loop can keep waiting for an outstanding
/// reply after a timeout.
#[async_trait]
pub trait OpcProbe: Send
{
    /// Issue the operation-complete query
    async fn request(&mut self) -> Result<()>;

    /// Wait for the answer to the outstanding query
    async fn reply(&mut self) -> Result<String>;
}

/// Polls `probe` until it reports done
///
/// Returns the number of replies waited for, counting timeouts. Fails with `PollExhausted` when
/// the policy bound is reached, or with the first error that is not a timeout.
pub async fn wait_complete<P>(probe: &mut P, policy: &PollPolicy) -> Result<u32>
    where P: OpcProbe + ?Sized
{
    let started = Instant::now();
    let mut state = PollState::Sent;
    let mut attempts = 0;
    let mut outstanding = false;

    while state != PollState::Complete {
        if policy.exhausted(attempts, started) {
            return Err(Error::PollExhausted { attempts: attempts });
        }

        if !outstanding {
            probe.request().await?;
            outstanding = true;
        }
        attempts += 1;
        state = PollState::Polling;

        match probe.reply().await {
            Ok(reply) => {
                outstanding = false;

                if reply.trim() == "1" {
                    debug!("OPC returned 1. Operation complete");
                    state = PollState::Complete;
                }
                else {
                    debug!("OPC returned {:?}. Operation not complete", reply);
                    tokio::time::sleep(policy.interval).await;
                }
            },
            Err(err) if err.is_timeout() => {
                debug!("OPC query timed out. Continue to wait");
            },
            Err(err) => return Err(err),
        }
    }

    Ok(attempts)
}

#[cfg(test)]
mod tests
{
    use super::{ wait_complete, OpcProbe, PollPolicy };
    use crate::error::{ Error, Result };
    use async_trait::async_trait;
    use std::{ collections::VecDeque, time::Duration };

    /// Answers from a script, one entry per reply
    struct ScriptedProbe
    {
        replies: VecDeque<Result<String>>,
        requests: u32,
        replies_taken: u32,
    }

    impl ScriptedProbe
    {
        fn new(replies: Vec<Result<String>>) -> Self
        {
            Self {
                replies: replies.into(),
                requests: 0,
                replies_taken: 0,
            }
        }
    }

    #[async_trait]
    impl OpcProbe for ScriptedProbe
    {
        async fn request(&mut self) -> Result<()>
        {
            self.requests += 1;
            Ok(())
        }

        async fn reply(&mut self) -> Result<String>
        {
            self.replies_taken += 1;
            self.replies.pop_front().unwrap_or_else(|| Ok("0".into()))
        }
    }

    fn timeout() -> Result<String>
    {
        Err(Error::Timeout { command: "*OPC?".into(), timeout: Duration::from_millis(1) })
    }

    fn fast() -> PollPolicy
    {
        PollPolicy {
            interval: Duration::ZERO,
            ..PollPolicy::unbounded()
        }
    }

    #[tokio::test]
    async fn n_busy_replies_take_n_plus_one_polls()
    {
        for n in 0..5 {
            let mut script: Vec<Result<String>> = (0..n).map(|_| Ok("0".to_string())).collect();
            script.push(Ok("1".into()));
            let mut probe = ScriptedProbe::new(script);

            let attempts = wait_complete(&mut probe, &fast()).await.unwrap();
            assert_eq!(attempts, n + 1);
            assert_eq!(probe.replies_taken, n + 1);
            assert_eq!(probe.requests, n + 1);
        }
    }

    #[tokio::test]
    async fn timeouts_do_not_abort_polling()
    {
        let mut probe = ScriptedProbe::new(vec![timeout(), timeout(), timeout(), Ok("1".into())]);

        assert_eq!(wait_complete(&mut probe, &fast()).await.unwrap(), 4);
        // the outstanding query is awaited again rather than re-issued
        assert_eq!(probe.requests, 1);
    }

    #[tokio::test]
    async fn io_errors_abort_polling()
    {
        let broken = Err(Error::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset)));
        let mut probe = ScriptedProbe::new(vec![Ok("0".into()), broken, Ok("1".into())]);

        assert!(matches!(wait_complete(&mut probe, &fast()).await, Err(Error::Io(_))));
        assert_eq!(probe.replies_taken, 2);
    }

    #[tokio::test]
    async fn attempt_bound_is_enforced()
    {
        let mut probe = ScriptedProbe::new(vec![]);
        let policy = PollPolicy { max_attempts: Some(3), ..fast() };

        match wait_complete(&mut probe, &policy).await {
            Err(Error::PollExhausted { attempts }) => assert_eq!(attempts, 3),
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(probe.replies_taken, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn duration_bound_is_enforced()
    {
        let mut probe = ScriptedProbe::new(vec![]);
        let policy = PollPolicy {
            max_attempts: None,
            max_duration: Some(Duration::from_secs(1)),
            interval: Duration::from_millis(100),
        };

        assert!(matches!(wait_complete(&mut probe, &policy).await, Err(Error::PollExhausted { .. })));
    }
}
