//! Voice-markup documents returned to the telephony carrier. The carrier
//! expects a well-formed `<Response>` on every inbound-call and status
//! callback, including error paths, so handlers build one of these instead of
//! returning an HTTP error.

use axum::http::header;
use axum::response::{IntoResponse, Response};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Say(String),
    /// Bridge the caller to `number`, hanging up after `time_limit_secs`.
    Dial { number: String, time_limit_secs: u32 },
}

/// Builder for a single voice-markup response document.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VoiceResponse {
    verbs: Vec<Verb>,
}

impl VoiceResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(mut self, message: impl Into<String>) -> Self {
        self.verbs.push(Verb::Say(message.into()));
        self
    }

    pub fn dial(mut self, number: impl Into<String>, time_limit_secs: u32) -> Self {
        self.verbs.push(Verb::Dial {
            number: number.into(),
            time_limit_secs,
        });
        self
    }

    pub fn render(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>");
        for verb in &self.verbs {
            match verb {
                Verb::Say(message) => {
                    xml.push_str("<Say>");
                    xml.push_str(&escape(message));
                    xml.push_str("</Say>");
                }
                Verb::Dial {
                    number,
                    time_limit_secs,
                } => {
                    xml.push_str(&format!(
                        "<Dial timeLimit=\"{}\"><Number>{}</Number></Dial>",
                        time_limit_secs,
                        escape(number)
                    ));
                }
            }
        }
        xml.push_str("</Response>");
        xml
    }
}

impl IntoResponse for VoiceResponse {
    fn into_response(self) -> Response {
        (
            [(header::CONTENT_TYPE, "application/xml")],
            self.render(),
        )
            .into_response()
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_response_is_a_bare_ack() {
        assert_eq!(
            VoiceResponse::new().render(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response></Response>"
        );
    }

    #[test]
    fn say_then_dial_renders_in_order() {
        let xml = VoiceResponse::new()
            .say("Connecting you now.")
            .dial("+18005550100", 1800)
            .render();
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>\
             <Say>Connecting you now.</Say>\
             <Dial timeLimit=\"1800\"><Number>+18005550100</Number></Dial>\
             </Response>"
        );
    }

    #[test]
    fn say_escapes_markup() {
        let xml = VoiceResponse::new().say("Press <1> & wait").render();
        assert!(xml.contains("<Say>Press &lt;1&gt; &amp; wait</Say>"));
    }
}
