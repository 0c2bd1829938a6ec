// 👤 Audit context - who is acting, and what time it is
//
// Threaded explicitly through every create/update call instead of reading an
// ambient "current user".

use chrono::{DateTime, Utc};

/// Time source used to stamp created/modified records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(at) => *at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditContext {
    /// Id of the user on whose behalf records are written
    pub user_id: i64,
    pub clock: Clock,
}

impl AuditContext {
    pub fn new(user_id: i64) -> Self {
        AuditContext {
            user_id,
            clock: Clock::System,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Actor string recorded in the audit trail
    pub fn actor(&self) -> String {
        format!("user:{}", self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_clock_is_stable() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let ctx = AuditContext::new(7).with_clock(Clock::Fixed(at));

        assert_eq!(ctx.now(), at);
        assert_eq!(ctx.now(), ctx.now());
        assert_eq!(ctx.actor(), "user:7");
    }
}
