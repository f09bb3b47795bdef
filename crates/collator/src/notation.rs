//! Compact textual notation for change events.
//!
//! Used in trace logs and to script event sequences in tests:
//!
//! | token            | event                                         |
//! |------------------|-----------------------------------------------|
//! | `ch_2_d`         | document edit on cell 2                       |
//! | `ch_2_x`         | execution update, no order yet                |
//! | `ch_2_x_4`       | execution update, order 4                     |
//! | `ch_2_x_4_true`  | execution update, order 4, succeeded          |
//! | `ch_2_m`         | metadata edit without counter (`m_null` too)  |
//! | `ch_2_m_4`       | metadata edit with execution counter 4        |
//! | `ch_2_o`         | outputs cleared                               |
//! | `ch_2_o_3`       | outputs replaced, 3 items                     |
//! | `cn_a_2,3`       | cells 2 and 3 inserted at 2                   |
//! | `cn_r_2,4`       | cells `[2, 4)` removed                        |
//! | `md`             | notebook metadata changed                     |
//!
//! A `ch` token may chain several changes for one cell (`ch_2_x_5_m_5`);
//! [`parse_script`] expands those into one event per change, in order.

use std::fmt;
use std::str::FromStr;

use nbwatch_primitives::CellIdx;
use serde_json::Value;
use thiserror::Error;

use crate::event::CellEvent;

/// Errors produced while parsing event notation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotationError {
	/// The token was empty.
	#[error("empty event token")]
	Empty,
	/// The token did not start with `ch`, `cn`, or `md`.
	#[error("unknown event prefix in {0:?}")]
	UnknownPrefix(String),
	/// A cell index or counter was not a number.
	#[error("invalid number {value:?} in {token:?}")]
	InvalidNumber {
		/// The whole token.
		token: String,
		/// The offending component.
		value: String,
	},
	/// A change code after the cell index was not recognized.
	#[error("unknown change {change:?} in {token:?}")]
	UnknownChange {
		/// The whole token.
		token: String,
		/// The offending component.
		change: String,
	},
	/// A structural token was missing its index list or range.
	#[error("malformed structural change {0:?}")]
	MalformedStructural(String),
	/// A single-event parse was given a chained token.
	#[error("token {0:?} describes {1} events, expected exactly one")]
	NotSingle(String, usize),
}

impl fmt::Display for CellEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::DocumentEdit { cell } => write!(f, "ch_{cell}_d"),
			Self::ExecutionUpdate {
				cell,
				execution_order,
				success,
			} => {
				write!(f, "ch_{cell}_x")?;
				if let Some(order) = execution_order {
					write!(f, "_{order}")?;
				}
				if let Some(success) = success {
					write!(f, "_{success}")?;
				}
				Ok(())
			}
			Self::MetadataChange { cell, execution_count } => {
				write!(f, "ch_{cell}_m")?;
				if let Some(count) = execution_count {
					write!(f, "_{count}")?;
				}
				Ok(())
			}
			Self::OutputsUpdate { cell, output_count, .. } => {
				write!(f, "ch_{cell}_o")?;
				if *output_count > 0 {
					write!(f, "_{output_count}")?;
				}
				Ok(())
			}
			Self::CellsAdded { cell_indexes, .. } => {
				let joined = cell_indexes.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
				write!(f, "cn_a_{joined}")
			}
			Self::CellsRemoved { start, end, .. } => write!(f, "cn_r_{start},{end}"),
			Self::NotebookMetadata { .. } => f.write_str("md"),
		}
	}
}

impl FromStr for CellEvent {
	type Err = NotationError;

	fn from_str(token: &str) -> Result<Self, Self::Err> {
		let mut events = parse_token(token)?;
		if events.len() != 1 {
			return Err(NotationError::NotSingle(token.to_string(), events.len()));
		}
		Ok(events.remove(0))
	}
}

/// Parses a whitespace-separated sequence of event tokens.
pub fn parse_script(script: &str) -> Result<Vec<CellEvent>, NotationError> {
	let mut events = Vec::new();
	for token in script.split_whitespace() {
		events.extend(parse_token(token)?);
	}
	Ok(events)
}

/// Renders events back into notation, space separated.
pub fn render_script<'a>(events: impl IntoIterator<Item = &'a CellEvent>) -> String {
	events.into_iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
}

fn parse_token(token: &str) -> Result<Vec<CellEvent>, NotationError> {
	let token = token.trim();
	if token.is_empty() {
		return Err(NotationError::Empty);
	}
	if token == "md" {
		return Ok(vec![CellEvent::NotebookMetadata { metadata: Value::Null }]);
	}
	let mut parts = token.split('_');
	match parts.next() {
		Some("ch") => parse_cell_changes(token, parts),
		Some("cn") => parse_structural(token, parts).map(|event| vec![event]),
		_ => Err(NotationError::UnknownPrefix(token.to_string())),
	}
}

fn parse_number<T: FromStr>(token: &str, value: &str) -> Result<T, NotationError> {
	value.parse().map_err(|_| NotationError::InvalidNumber {
		token: token.to_string(),
		value: value.to_string(),
	})
}

fn parse_cell_changes<'a>(token: &str, parts: impl Iterator<Item = &'a str>) -> Result<Vec<CellEvent>, NotationError> {
	let mut parts = parts.peekable();
	let Some(index) = parts.next() else {
		return Err(NotationError::InvalidNumber {
			token: token.to_string(),
			value: String::new(),
		});
	};
	let cell: CellIdx = parse_number(token, index)?;
	let mut events = Vec::new();

	while let Some(change) = parts.next() {
		match change {
			"d" => events.push(CellEvent::DocumentEdit { cell }),
			"x" => {
				let execution_order = match parts.peek() {
					Some(next) if next.parse::<i64>().is_ok() => parts.next().map(|n| parse_number(token, n)).transpose()?,
					_ => None,
				};
				let success = match parts.peek() {
					Some(&"true") => {
						parts.next();
						Some(true)
					}
					Some(&"false") => {
						parts.next();
						Some(false)
					}
					_ => None,
				};
				events.push(CellEvent::ExecutionUpdate {
					cell,
					execution_order,
					success,
				});
			}
			"m" => {
				let execution_count = match parts.peek() {
					Some(&"null") => {
						parts.next();
						None
					}
					Some(next) if next.parse::<i64>().is_ok() => parts.next().map(|n| parse_number(token, n)).transpose()?,
					_ => None,
				};
				events.push(CellEvent::MetadataChange { cell, execution_count });
			}
			"o" => {
				let output_count = match parts.peek() {
					Some(next) if next.parse::<usize>().is_ok() => parts.next().map(|n| parse_number(token, n)).transpose()?.unwrap_or(0),
					_ => 0,
				};
				events.push(CellEvent::outputs(cell, output_count));
			}
			other => {
				return Err(NotationError::UnknownChange {
					token: token.to_string(),
					change: other.to_string(),
				});
			}
		}
	}

	if events.is_empty() {
		return Err(NotationError::UnknownChange {
			token: token.to_string(),
			change: String::new(),
		});
	}
	Ok(events)
}

fn parse_structural<'a>(token: &str, mut parts: impl Iterator<Item = &'a str>) -> Result<CellEvent, NotationError> {
	let (Some(op), Some(list), None) = (parts.next(), parts.next(), parts.next()) else {
		return Err(NotationError::MalformedStructural(token.to_string()));
	};
	let indexes = list
		.split(',')
		.map(|n| parse_number::<CellIdx>(token, n))
		.collect::<Result<Vec<_>, _>>()?;

	match (op, indexes.as_slice()) {
		("a", [start, ..]) => Ok(CellEvent::CellsAdded {
			start: *start,
			cell_indexes: indexes.clone(),
			cell_count: None,
		}),
		("r", [start, end]) => Ok(CellEvent::CellsRemoved {
			start: *start,
			end: *end,
			cell_count: None,
		}),
		_ => Err(NotationError::MalformedStructural(token.to_string())),
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn single_tokens_render_back_unchanged() {
		for token in [
			"ch_2_d",
			"ch_2_x",
			"ch_2_x_2",
			"ch_2_x_4_true",
			"ch_2_x_4_false",
			"ch_2_o",
			"ch_2_o_1",
			"ch_2_m",
			"ch_2_m_3",
			"cn_r_2,3",
			"cn_a_2",
			"cn_a_2,3",
			"md",
		] {
			let event: CellEvent = token.parse().unwrap();
			assert_eq!(event.to_string(), token);
		}
	}

	#[test]
	fn chained_token_expands_in_order() {
		let events = parse_script("ch_2_x_5_m_5").unwrap();
		assert_eq!(
			events,
			vec![
				CellEvent::ExecutionUpdate {
					cell: 2,
					execution_order: Some(5),
					success: None,
				},
				CellEvent::MetadataChange {
					cell: 2,
					execution_count: Some(5),
				},
			]
		);
		assert_eq!(render_script(&events), "ch_2_x_5 ch_2_m_5");
	}

	#[test]
	fn null_metadata_counter_is_undefined() {
		let event: CellEvent = "ch_3_m_null".parse().unwrap();
		assert_eq!(
			event,
			CellEvent::MetadataChange {
				cell: 3,
				execution_count: None,
			}
		);
	}

	#[test]
	fn script_mixes_cell_and_structural_tokens() {
		let events = parse_script("ch_1_d ch_2_x ch_3_o cn_r_4,5 cn_a_2").unwrap();
		assert_eq!(events.len(), 5);
		assert_eq!(events[3], CellEvent::CellsRemoved { start: 4, end: 5, cell_count: None });
	}

	#[test]
	fn rejects_malformed_tokens() {
		assert_eq!("".parse::<CellEvent>(), Err(NotationError::Empty));
		assert!(matches!("zz_1_d".parse::<CellEvent>(), Err(NotationError::UnknownPrefix(_))));
		assert!(matches!("ch_one_d".parse::<CellEvent>(), Err(NotationError::InvalidNumber { .. })));
		assert!(matches!("ch_1_q".parse::<CellEvent>(), Err(NotationError::UnknownChange { .. })));
		assert!(matches!("cn_r_2".parse::<CellEvent>(), Err(NotationError::MalformedStructural(_))));
		assert!(matches!("ch_2_x_5_m_5".parse::<CellEvent>(), Err(NotationError::NotSingle(_, 2))));
	}
}
