//! Scripted input: turns command-line options into the sequence of client
//! commands the bot sends, one per step.

use shared::commands::client::{ChangeHeading, ClientCommand, Online, Ping, Quit, Talk, Walk};
use shared::Heading;
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("invalid direction {0:?} at position {1}, expected one of N, E, S, W")]
    InvalidDirection(char, usize),
}

/// Parses a route such as `"NNEESW"`. Whitespace is ignored.
pub fn parse_route(route: &str) -> Result<Vec<Heading>, RouteError> {
    route
        .chars()
        .filter(|c| !c.is_whitespace())
        .enumerate()
        .map(|(i, c)| Heading::from_char(c).ok_or(RouteError::InvalidDirection(c, i)))
        .collect()
}

/// Queue of scripted commands.
#[derive(Debug, Default)]
pub struct InputManager {
    pending: VecDeque<ClientCommand>,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Says hello, walks the route, checks who is online, pings and quits.
    pub fn scripted(route: &[Heading], say: Option<&str>) -> Self {
        let mut input = Self::new();
        if let Some(message) = say {
            input.push(Talk {
                message: message.to_string(),
            });
        }
        for heading in route {
            input.push(Walk { heading: *heading });
        }
        if let Some(last) = route.last() {
            input.push(ChangeHeading { heading: *last });
        }
        input.push(Online {});
        input.push(Ping {});
        input.push(Quit {});
        input
    }

    pub fn push(&mut self, command: impl Into<ClientCommand>) {
        self.pending.push_back(command.into());
    }

    pub fn next_command(&mut self) -> Option<ClientCommand> {
        self.pending.pop_front()
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_route() {
        assert_eq!(
            parse_route("nE s w").unwrap(),
            vec![Heading::North, Heading::East, Heading::South, Heading::West]
        );
        assert!(parse_route("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_route_rejects_unknown_letters() {
        assert_eq!(parse_route("NX"), Err(RouteError::InvalidDirection('X', 1)));
    }

    #[test]
    fn test_scripted_order() {
        let mut input = InputManager::scripted(&[Heading::North], Some("hola"));
        assert_eq!(input.remaining(), 6);
        assert!(matches!(input.next_command(), Some(ClientCommand::Talk(_))));
        assert!(matches!(input.next_command(), Some(ClientCommand::Walk(_))));
        assert!(matches!(input.next_command(), Some(ClientCommand::ChangeHeading(_))));
        assert!(matches!(input.next_command(), Some(ClientCommand::Online(_))));
        assert!(matches!(input.next_command(), Some(ClientCommand::Ping(_))));
        assert!(matches!(input.next_command(), Some(ClientCommand::Quit(_))));
        assert!(input.is_done());
    }
}
