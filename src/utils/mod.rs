use std::time::Instant;
use tracing::info;

/// Logs how long a scrape step took once it goes out of scope.
pub struct Timer {
    step: &'static str,
    started: Instant,
}

impl Timer {
    pub fn start(step: &'static str) -> Self {
        info!("⏱  {} started", step);
        Self {
            step,
            started: Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        info!(
            elapsed_ms = elapsed.as_millis() as u64,
            "⏱  {} finished in {:.2?}",
            self.step,
            elapsed
        );
    }
}

/// Login identifier safe for logs: first character of the local part, then
/// the domain. `trader@example.com` → `t***@example.com`
pub fn mask_identity(identity: &str) -> String {
    let (local, domain) = match identity.split_once('@') {
        Some((local, domain)) => (local, Some(domain)),
        None => (identity, None),
    };
    let first: String = local.chars().take(1).collect();
    match domain {
        Some(domain) => format!("{}***@{}", first, domain),
        None => format!("{}***", first),
    }
}

/// Thousands separators for the `stats` table.
pub fn fmt_number(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
