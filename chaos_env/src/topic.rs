//! MQTT-style topic names and subscription filters.
//!
//! `+` matches exactly one level, a trailing `#` matches any number of
//! remaining levels (including none). Topics beginning with `$` are never
//! matched by a leading wildcard.

use crate::error::EnvError;

/// Checks that `topic` is a concrete topic name usable for publishing.
pub fn validate_topic(topic: &str) -> Result<(), EnvError> {
    if topic.is_empty() {
        return Err(EnvError::invalid_topic("<empty>"));
    }
    if !rumqttc::valid_topic(topic) {
        return Err(EnvError::invalid_topic(topic));
    }
    Ok(())
}

/// Checks that `filter` is a well-formed subscription filter.
pub fn validate_filter(filter: &str) -> Result<(), EnvError> {
    if filter.is_empty() {
        return Err(EnvError::invalid_topic("<empty>"));
    }
    if !rumqttc::valid_filter(filter) {
        return Err(EnvError::invalid_topic(filter));
    }
    Ok(())
}

/// Returns true if `topic` matches the subscription `filter`.
///
/// Both arguments are assumed to be valid; see [`validate_filter`].
/// `rumqttc::matches` refuses every `$` topic, so those are matched here
/// only by a filter that names the same first level (`$SYS/#`).
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if !topic.starts_with('$') {
        return rumqttc::matches(topic, filter);
    }
    
    let (topic_head, topic_rest) = split_first_level(topic);
    let (filter_head, filter_rest) = split_first_level(filter);
    if topic_head != filter_head {
        return false;
    }
    
    match (filter_rest, topic_rest) {
        (None, None) | (Some("#"), _) => true,
        (Some(filter), Some(topic)) => rumqttc::matches(topic, filter),
        _ => false,
    }
}

fn split_first_level(name: &str) -> (&str, Option<&str>) {
    match name.split_once('/') {
        Some((head, rest)) => (head, Some(rest)),
        None => (name, None),
    }
}
