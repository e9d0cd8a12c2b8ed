//! Response builder handed to request handlers.
//!
//! A handler receives a fresh `ResponseBuilder`, declares what it wants the
//! request to observe, and hands the builder back. Declaring a timeout wins
//! over everything else; otherwise the builder is read as a normal response.

use std::time::Duration;

use serde::Serialize;

use crate::error::XhrError;
use crate::handler::Outcome;
use crate::http::{Headers, HttpResponse};

/// How long a simulated timeout takes to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutDelay {
    /// One millisecond past the request's `timeout` property.
    Default,
    /// An explicit delay.
    After(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseBuilder {
    status: u16,
    status_text: String,
    headers: Headers,
    body: Option<String>,
    timeout: Option<TimeoutDelay>,
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self {
            status: 200,
            status_text: String::new(),
            headers: Headers::new(),
            body: None,
            timeout: None,
        }
    }
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = status_text.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn headers<N, V>(mut self, headers: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        for (name, value) in headers {
            self.headers.set(name, value);
        }
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the body and declare a JSON content type.
    pub fn json<T: Serialize>(self, value: &T) -> Result<Self, XhrError> {
        let body =
            serde_json::to_string(value).map_err(|e| XhrError::Serialization(e.to_string()))?;
        Ok(self.header("content-type", "application/json").body(body))
    }

    /// `true` simulates a timeout after the default delay, `false` clears any
    /// timeout declared earlier.
    pub fn timeout(mut self, timeout: bool) -> Self {
        self.timeout = timeout.then_some(TimeoutDelay::Default);
        self
    }

    /// Simulate a timeout after `delay`. A zero delay declares no timeout.
    pub fn timeout_after(mut self, delay: Duration) -> Self {
        self.timeout = (!delay.is_zero()).then_some(TimeoutDelay::After(delay));
        self
    }

    pub fn get_status(&self) -> u16 {
        self.status
    }

    pub fn get_status_text(&self) -> &str {
        &self.status_text
    }

    pub fn get_headers(&self) -> &Headers {
        &self.headers
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get_ignore_case(name)
    }

    pub fn get_body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn get_timeout(&self) -> Option<TimeoutDelay> {
        self.timeout
    }

    /// Interpret the declarations as an outcome.
    pub fn into_outcome(self) -> Outcome {
        match self.timeout {
            Some(TimeoutDelay::Default) => Outcome::TimedOut(None),
            Some(TimeoutDelay::After(delay)) => Outcome::TimedOut(Some(delay)),
            None => Outcome::Responded(HttpResponse {
                status: self.status,
                status_text: self.status_text,
                headers: self.headers,
                body: self.body,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_builder_is_an_empty_200() {
        let outcome = ResponseBuilder::new().into_outcome();
        assert_eq!(
            outcome,
            Outcome::Responded(HttpResponse {
                status: 200,
                status_text: String::new(),
                headers: Headers::new(),
                body: None,
            })
        );
    }

    #[test]
    fn timeout_takes_precedence_over_response_fields() {
        let outcome = ResponseBuilder::new()
            .status(201)
            .body("ignored")
            .timeout(true)
            .into_outcome();
        assert_eq!(outcome, Outcome::TimedOut(None));
    }

    #[test]
    fn explicit_timeout_delay_is_carried() {
        let outcome = ResponseBuilder::new()
            .timeout_after(Duration::from_millis(250))
            .into_outcome();
        assert_eq!(outcome, Outcome::TimedOut(Some(Duration::from_millis(250))));
    }

    #[test]
    fn timeout_false_clears_earlier_declaration() {
        let builder = ResponseBuilder::new().timeout(true).timeout(false);
        assert_eq!(builder.get_timeout(), None);
        assert!(matches!(builder.into_outcome(), Outcome::Responded(_)));
    }

    #[test]
    fn zero_delay_answers_normally() {
        let builder = ResponseBuilder::new()
            .status(202)
            .timeout_after(Duration::ZERO);
        assert_eq!(builder.get_timeout(), None);
        assert!(matches!(
            builder.into_outcome(),
            Outcome::Responded(HttpResponse { status: 202, .. })
        ));
    }

    #[test]
    fn status_setters_are_read_back() {
        let builder = ResponseBuilder::new().status(418).status_text("I'm a teapot");
        assert_eq!(builder.get_status(), 418);
        assert_eq!(builder.get_status_text(), "I'm a teapot");
        assert_eq!(ResponseBuilder::new().get_status(), 200);
    }

    #[test]
    fn json_sets_body_and_content_type() {
        let builder = ResponseBuilder::new()
            .json(&serde_json::json!({"id": 7, "done": true}))
            .unwrap();
        assert_eq!(builder.get_header("Content-Type"), Some("application/json"));
        let body: serde_json::Value = serde_json::from_str(builder.get_body().unwrap()).unwrap();
        assert_eq!(body["id"], 7);
        assert_eq!(body["done"], true);
    }

    #[test]
    fn headers_extend_in_declaration_order() {
        let builder = ResponseBuilder::new()
            .header("X-First", "1")
            .headers([("X-Second", "2"), ("X-Third", "3")]);
        let names: Vec<_> = builder.get_headers().iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["X-First", "X-Second", "X-Third"]);
    }
}
