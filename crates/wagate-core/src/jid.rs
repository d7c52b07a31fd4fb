// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp JID formatting and E.164 phone normalization.
//!
//! Contacts live at `<digits>@s.whatsapp.net` (historically `@c.us`);
//! groups at `<id>@g.us`. Webhook envelopes carry E.164 numbers.

use crate::WagateError;

/// Suffix for contact JIDs.
pub const CONTACT_SUFFIX: &str = "@s.whatsapp.net";
/// Legacy contact suffix still seen on inbound traffic.
pub const LEGACY_CONTACT_SUFFIX: &str = "@c.us";
/// Suffix for group JIDs.
pub const GROUP_SUFFIX: &str = "@g.us";

/// Returns true when the address is a group JID.
pub fn is_group_jid(jid: &str) -> bool {
    jid.ends_with(GROUP_SUFFIX)
}

/// Produces the wire JID for an outbound send target.
///
/// Group JIDs and already-formed contact JIDs pass through; bare numbers
/// are stripped of formatting and suffixed with `@s.whatsapp.net`.
pub fn to_wire_jid(target: &str) -> Result<String, WagateError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(WagateError::Validation("empty send target".into()));
    }
    if is_group_jid(target) || target.ends_with(CONTACT_SUFFIX) {
        return Ok(target.to_string());
    }
    let digits: String = target
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '+' && *c != '(' && *c != ')')
        .collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(WagateError::Validation(format!(
            "not a phone number or JID: {target}"
        )));
    }
    Ok(format!("{digits}{CONTACT_SUFFIX}"))
}

/// Normalizes a JID or raw number to E.164 form.
///
/// Strips the `@s.whatsapp.net` / `@c.us` suffix, removes whitespace and
/// hyphens, and prefixes `+` if absent. Idempotent:
/// `normalize_e164(normalize_e164(x)) == normalize_e164(x)`.
pub fn normalize_e164(number: &str) -> String {
    let bare = number
        .strip_suffix(CONTACT_SUFFIX)
        .or_else(|| number.strip_suffix(LEGACY_CONTACT_SUFFIX))
        .unwrap_or(number);
    let cleaned: String = bare
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    match cleaned.strip_prefix('+') {
        Some(rest) => format!("+{rest}"),
        None => format!("+{cleaned}"),
    }
}
