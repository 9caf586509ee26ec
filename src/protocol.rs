//! Messages exchanged with the search worker.
//!
//! Requests are JSON objects. A search request carries a grid snapshot and a
//! depth/time budget; `{"command": "ping"}` asks whether the worker is alive.
//! The field names of the original game front end (`gridState`, `timeLimit`)
//! are accepted as aliases.
//!
//! ```
//! use bot_2048::protocol::{handle_line, Response};
//! let reply = handle_line(r#"{"command": "ping"}"#);
//! assert_eq!(reply, Response::ready());
//! assert_eq!(serde_json::to_string(&reply).unwrap(), r#"{"status":"ready"}"#);
//! ```

use std::fmt;
use std::time::Duration;

use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::codec::{self, GridSnapshot};
use crate::engine::Move;
use crate::expectimax;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("message is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown command {0}")]
    UnknownCommand(String),
    #[error("malformed search request: {0}")]
    Malformed(String),
    #[error("{0} must be positive")]
    NonPositive(&'static str),
}

/// A request for one move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(alias = "gridState")]
    pub board: GridSnapshot,
    pub max_depth: u32,
    #[serde(alias = "timeLimit")]
    pub time_limit_ms: u64,
}

impl SearchRequest {
    pub fn new(board: GridSnapshot, max_depth: u32, time_limit_ms: u64) -> Self {
        Self { board, max_depth, time_limit_ms }
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        if self.max_depth == 0 {
            return Err(ProtocolError::NonPositive("maxDepth"));
        }
        if self.time_limit_ms == 0 {
            return Err(ProtocolError::NonPositive("timeLimitMs"));
        }
        Ok(())
    }

    /// Run the search. A snapshot that cannot be packed yields "no move".
    pub fn execute(&self) -> Response {
        let board = match codec::encode(&self.board) {
            Ok(board) => board,
            Err(e) => {
                warn!("cannot decode grid snapshot ({}), answering with no move", e);
                return Response::chosen(None);
            }
        };
        let decision =
            expectimax::find_best_move(board, self.max_depth, Duration::from_millis(self.time_limit_ms));
        Response::chosen(decision.best_move)
    }
}

/// A parsed inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Ping,
    Search(SearchRequest),
}

impl Message {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        if let Some(command) = value.get("command") {
            return match command.as_str() {
                Some("ping") => Ok(Message::Ping),
                _ => Err(ProtocolError::UnknownCommand(command.to_string())),
            };
        }
        let request: SearchRequest =
            serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        request.validate()?;
        Ok(Message::Search(request))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ready,
}

/// An outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Status {
        status: Status,
    },
    Move {
        #[serde(rename = "chosenDirection")]
        chosen_direction: Option<Move>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl Response {
    pub fn ready() -> Self { Response::Status { status: Status::Ready } }

    pub fn chosen(direction: Option<Move>) -> Self {
        Response::Move { chosen_direction: direction, error: None }
    }

    pub fn error(reason: impl fmt::Display) -> Self {
        Response::Move { chosen_direction: None, error: Some(reason.to_string()) }
    }

    /// The chosen direction, if this is a move response that has one.
    pub fn chosen_direction(&self) -> Option<Move> {
        match self {
            Response::Move { chosen_direction, .. } => *chosen_direction,
            Response::Status { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Move { error: Some(_), .. })
    }
}

/// Answer one parsed message.
pub fn handle(message: Message) -> Response {
    match message {
        Message::Ping => {
            debug!("ping");
            Response::ready()
        }
        Message::Search(request) => request.execute(),
    }
}

/// Answer one raw JSON message; malformed input gets an error response.
pub fn handle_line(line: &str) -> Response {
    match Message::parse(line) {
        Ok(message) => handle(message),
        Err(e) => {
            error!("rejecting message: {}", e);
            Response::error(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SNAPSHOT: &str = r#"{"size": 4, "cells": [
        [{"value": 2}, null, null, null],
        [null, null, null, null],
        [null, null, null, null],
        [null, null, null, {"value": 2}]
    ]}"#;

    #[test]
    fn parses_both_field_spellings() {
        let modern = format!(r#"{{"board": {}, "maxDepth": 2, "timeLimitMs": 50}}"#, SNAPSHOT);
        let legacy = format!(r#"{{"gridState": {}, "maxDepth": 2, "timeLimit": 50}}"#, SNAPSHOT);
        let a = Message::parse(&modern).unwrap();
        let b = Message::parse(&legacy).unwrap();
        assert_eq!(a, b);
        match a {
            Message::Search(req) => {
                assert_eq!(req.max_depth, 2);
                assert_eq!(req.time_limit_ms, 50);
                assert_eq!(req.board.value_at(3, 3), Some(2));
            }
            Message::Ping => panic!("expected a search request"),
        }
    }

    #[test]
    fn missing_fields_are_malformed() {
        let err = Message::parse(&format!(r#"{{"board": {}, "maxDepth": 2}}"#, SNAPSHOT)).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
        let err = Message::parse(r#"{"maxDepth": 2, "timeLimitMs": 10}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
        assert!(matches!(Message::parse("not json").unwrap_err(), ProtocolError::Json(_)));
    }

    #[test]
    fn zero_budget_is_rejected() {
        let err = Message::parse(&format!(r#"{{"board": {}, "maxDepth": 0, "timeLimitMs": 10}}"#, SNAPSHOT))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::NonPositive("maxDepth")));
    }

    #[test]
    fn unknown_command_is_an_error_response() {
        let reply = handle_line(r#"{"command": "reboot"}"#);
        assert!(reply.is_error());
        assert_eq!(reply.chosen_direction(), None);
    }

    #[test]
    fn response_wire_format() {
        let json = serde_json::to_string(&Response::chosen(Some(Move::Left))).unwrap();
        assert_eq!(json, r#"{"chosenDirection":"left"}"#);
        let json = serde_json::to_string(&Response::chosen(None)).unwrap();
        assert_eq!(json, r#"{"chosenDirection":null}"#);
        let back: Response = serde_json::from_str(r#"{"chosenDirection":"down"}"#).unwrap();
        assert_eq!(back.chosen_direction(), Some(Move::Down));
        let err: Response = serde_json::from_str(r#"{"chosenDirection":null,"error":"bad"}"#).unwrap();
        assert!(err.is_error());
    }

    #[test]
    fn undecodable_snapshot_answers_no_move() {
        let req = SearchRequest::new(GridSnapshot::empty(5), 2, 10);
        assert_eq!(req.execute(), Response::chosen(None));
        let mut bad = GridSnapshot::empty(4);
        bad.cells[1][1] = Some(codec::TileState { value: 6, position: None });
        assert_eq!(SearchRequest::new(bad, 2, 10).execute(), Response::chosen(None));
    }

    #[test]
    fn search_request_picks_a_legal_move() {
        let reply = handle_line(&format!(r#"{{"board": {}, "maxDepth": 2, "timeLimitMs": 1000}}"#, SNAPSHOT));
        assert!(!reply.is_error());
        assert!(reply.chosen_direction().is_some());
    }
}
