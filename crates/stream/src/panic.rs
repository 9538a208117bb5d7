use std::any::Any;

/// Extracts a readable message from a caught panic payload.
///
/// Payloads raised through `panic!` are either `&'static str` or `String`;
/// anything else is reported as opaque.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		return (*msg).to_string();
	}
	if let Some(msg) = payload.downcast_ref::<String>() {
		return msg.clone();
	}
	"non-string panic payload".to_string()
}
