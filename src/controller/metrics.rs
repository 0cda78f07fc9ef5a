use std::collections::HashMap;

pub const UPLOAD: &str = "upload";
pub const PROCESS: &str = "process";
pub const PROGRESS: &str = "progress";
pub const DELETE: &str = "delete";

/// Request outcomes per endpoint
#[derive(Debug, Clone, Default)]
pub struct RequestMetrics {
    success_counts: HashMap<String, u64>,
    failure_counts: HashMap<String, u64>,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, endpoint: &str, ok: bool) {
        if ok {
            self.record_success(endpoint);
        } else {
            self.record_failure(endpoint);
        }
    }

    pub fn record_success(&mut self, endpoint: &str) {
        *self
            .success_counts
            .entry(endpoint.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_failure(&mut self, endpoint: &str) {
        *self
            .failure_counts
            .entry(endpoint.to_string())
            .or_insert(0) += 1;
    }

    pub fn get_success_count(&self, endpoint: &str) -> u64 {
        *self.success_counts.get(endpoint).unwrap_or(&0)
    }

    pub fn get_failure_count(&self, endpoint: &str) -> u64 {
        *self.failure_counts.get(endpoint).unwrap_or(&0)
    }

    pub fn total_requests(&self, endpoint: &str) -> u64 {
        self.get_success_count(endpoint) + self.get_failure_count(endpoint)
    }

    pub fn get_success_rate(&self, endpoint: &str) -> f32 {
        let success = self.get_success_count(endpoint) as f32;
        let total = self.total_requests(endpoint) as f32;

        if total == 0.0 {
            0.0
        } else {
            success / total
        }
    }

    /// One line per endpoint that saw traffic, sorted by name
    pub fn summary(&self) -> Vec<String> {
        let mut endpoints: Vec<&String> = self
            .success_counts
            .keys()
            .chain(self.failure_counts.keys())
            .collect();
        endpoints.sort();
        endpoints.dedup();

        endpoints
            .into_iter()
            .map(|endpoint| {
                format!(
                    "{}: {} ok, {} failed ({:.0}% success)",
                    endpoint,
                    self.get_success_count(endpoint),
                    self.get_failure_count(endpoint),
                    self.get_success_rate(endpoint) * 100.0
                )
            })
            .collect()
    }
}
