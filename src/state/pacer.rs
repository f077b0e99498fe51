use std::time::{Duration, Instant};

/// Spaces consecutive requests to the archive host
///
/// The archive throttles clients that hammer it, so the pool dispatcher waits
/// on the pacer before every dispatch. The pacer only tracks when the last
/// request left; it does not limit how many are in flight.
#[derive(Debug, Clone)]
pub struct Pacer {
    /// Minimum spacing between two dispatches
    pub min_interval: Duration,

    /// Timestamp of the last dispatch
    pub last_request_time: Option<Instant>,

    /// Number of dispatches recorded so far
    pub request_count: u64,
}

impl Pacer {
    /// Creates a pacer with the given minimum spacing
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request_time: None,
            request_count: 0,
        }
    }

    /// Checks if a request can be sent at `now`
    pub fn can_request(&self, now: Instant) -> bool {
        self.time_until_next_request(now).is_none()
    }

    /// Returns None if a request can be made now, or the duration to wait otherwise
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        if let Some(last) = self.last_request_time {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.min_interval {
                return Some(self.min_interval - elapsed);
            }
        }
        None
    }

    /// Records that a request was sent at `now`
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(now);
    }

    /// Sleeps until a request may be sent, then records it
    pub async fn wait_turn(&mut self) {
        if let Some(wait) = self.time_until_next_request(Instant::now()) {
            tokio::time::sleep(wait).await;
        }
        self.record_request(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_request_initially() {
        let pacer = Pacer::new(Duration::from_millis(1000));
        assert!(pacer.can_request(Instant::now()));
        assert_eq!(pacer.request_count, 0);
    }

    #[test]
    fn test_cannot_request_too_soon() {
        let mut pacer = Pacer::new(Duration::from_millis(1000));
        let now = Instant::now();
        pacer.record_request(now);

        assert!(!pacer.can_request(now));
        assert!(!pacer.can_request(now + Duration::from_millis(500)));
        assert!(pacer.can_request(now + Duration::from_millis(1100)));
    }

    #[test]
    fn test_time_until_next_request() {
        let mut pacer = Pacer::new(Duration::from_millis(1000));
        let now = Instant::now();

        assert!(pacer.time_until_next_request(now).is_none());

        pacer.record_request(now);
        assert_eq!(
            pacer.time_until_next_request(now),
            Some(Duration::from_millis(1000))
        );
        assert_eq!(
            pacer.time_until_next_request(now + Duration::from_millis(400)),
            Some(Duration::from_millis(600))
        );
        assert!(pacer
            .time_until_next_request(now + Duration::from_millis(1000))
            .is_none());
    }

    #[tokio::test]
    async fn test_wait_turn_spaces_requests() {
        let mut pacer = Pacer::new(Duration::from_millis(50));
        let start = Instant::now();

        pacer.wait_turn().await;
        pacer.wait_turn().await;
        pacer.wait_turn().await;

        assert_eq!(pacer.request_count, 3);
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
