// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per table family.

pub mod groups;
pub mod messages;
pub mod organizations;
pub mod sessions;
pub mod usage;
pub mod webhooks;

/// Current UTC time as an ISO 8601 string, millisecond precision.
///
/// Matches the `strftime('%Y-%m-%dT%H:%M:%fZ', 'now')` format used by the
/// schema defaults so string ordering equals time ordering.
pub(crate) fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_iso_shape() {
        let ts = now_iso();
        assert_eq!(ts.len(), 24, "got {ts}");
        assert!(ts.ends_with('Z'));
        assert!(ts.contains('T'));
    }
}
