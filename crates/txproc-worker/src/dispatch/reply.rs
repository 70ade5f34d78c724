//! Construction of reply events.

use txproc_wire::{Event, EventType};

/// Named argument tagging replies with the worker's identity.
pub const GENERATED_BY: &str = "generatedby";
/// Named argument on inputs naming the queue replies should go to.
pub const RESULT_QUEUE: &str = "resultQueue";

/// Successful reply prepared for every input before dispatch.
pub(crate) fn default_reply(input: &Event, app_name: &str) -> Event {
    let mut reply = Event::new(EventType::Result);
    reply.set_success(true);
    if let Some(reference) = input.reference() {
        reply.set_reference(reference);
    }
    if let Some(queue) = input.param_str(RESULT_QUEUE) {
        reply.set_dest_queue(queue);
    }
    reply.set_param(GENERATED_BY, app_name);
    reply
}

/// Reply sent when a handler cleared the pending slot.
pub(crate) fn bare_success() -> Event {
    let mut reply = Event::new(EventType::Result);
    reply.set_success(true);
    reply
}

/// Failed reply with no correlation to any input.
pub(crate) fn failure_reply(error: impl Into<String>) -> Event {
    let mut reply = Event::new(EventType::Result);
    reply.set_success(false);
    reply.set_error_string(error);
    reply
}

/// Failed reply that keeps the input's reference and result queue.
pub(crate) fn failure_reply_for(input: &Event, error: impl Into<String>) -> Event {
    let mut reply = failure_reply(error);
    if let Some(reference) = input.reference() {
        reply.set_reference(reference);
    }
    if let Some(queue) = input.param_str(RESULT_QUEUE) {
        reply.set_dest_queue(queue);
    }
    reply
}

/// Result event addressed to the input's result queue.
///
/// `status` lands in the `result` field; `err_type` and `error` become the
/// `type` and `error` named arguments when present.
pub(crate) fn return_event(
    input: &Event,
    app_name: &str,
    err_type: Option<&str>,
    status: &str,
    error: Option<&str>,
) -> Event {
    let mut event = Event::new(EventType::Result);
    if let Some(queue) = input.param_str(RESULT_QUEUE) {
        event.set_dest_queue(queue);
    }
    event.set_result(status);
    if let Some(reference) = input.reference() {
        event.set_reference(reference);
    }
    if let Some(err_type) = err_type {
        event.set_param("type", err_type);
    }
    if let Some(error) = error {
        event.set_param("error", error);
    }
    event.set_param(GENERATED_BY, app_name);
    event
}
