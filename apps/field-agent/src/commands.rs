//! Operator commands read from stdin.

use fleetops_protocol::types::Coordinates;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `<lat> <lon>` or `loc <lat> <lon>`: report a position.
    Location(Coordinates),
    /// `token <value>`: store a new auth token and reconnect.
    Token(String),
    Connect,
    Disconnect,
    Status,
    Quit,
    Empty,
}

/// Parses one line of operator input.
pub fn parse(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Ok(Command::Empty);
    };
    let rest: Vec<&str> = parts.collect();

    match (head, rest.as_slice()) {
        ("token", [value]) => Ok(Command::Token((*value).to_string())),
        ("token", _) => Err("usage: token <value>".into()),
        ("connect", []) => Ok(Command::Connect),
        ("disconnect", []) => Ok(Command::Disconnect),
        ("status", []) => Ok(Command::Status),
        ("quit" | "exit", []) => Ok(Command::Quit),
        ("loc", [lat, lon]) => parse_coordinates(lat, lon),
        (lat, [lon]) => parse_coordinates(lat, lon),
        _ => Err(format!("unrecognized command: {}", line.trim())),
    }
}

fn parse_coordinates(lat: &str, lon: &str) -> Result<Command, String> {
    let latitude: f64 = lat.parse().map_err(|_| format!("bad latitude: {lat}"))?;
    let longitude: f64 = lon.parse().map_err(|_| format!("bad longitude: {lon}"))?;
    let coordinates = Coordinates::new(latitude, longitude);
    if !coordinates.is_valid() {
        return Err(format!("coordinates out of range: {latitude} {longitude}"));
    }
    Ok(Command::Location(coordinates))
}
