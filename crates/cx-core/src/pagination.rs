//! # Cursor Pagination
//!
//! Keyset ("seek method") windows over the movie collection.
//!
//! A cursor is URL-safe base64 of `{"values": {...}, "order": [...]}` holding,
//! for every ordering key, that key's value on the last row of the previous
//! page. A window resumes strictly after that tuple under the same ordering.
//!
//! Keys are not required to be unique and no tiebreaker is appended: with a
//! non-unique ordering (e.g. `likeCount_DESC` alone) rows sharing the boundary
//! value can be skipped at a page edge. Include `id` as the last key for
//! gap-free iteration.
//!
//! Windows fetch exactly `take` rows. A non-empty page always yields a next
//! cursor, even when nothing follows it; callers detect the end by getting a
//! short or empty page.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Movie;

pub const DEFAULT_ORDER: &str = "id_DESC";
pub const DEFAULT_TAKE: i64 = 5;
pub const MAX_TAKE: i64 = 100;

/// Columns a movie listing may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Id,
    Title,
    LikeCount,
    DislikeCount,
}

impl SortField {
    pub fn name(self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::Title => "title",
            SortField::LikeCount => "likeCount",
            SortField::DislikeCount => "dislikeCount",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "id" => Some(SortField::Id),
            "title" => Some(SortField::Title),
            "likeCount" => Some(SortField::LikeCount),
            "dislikeCount" => Some(SortField::DislikeCount),
            _ => None,
        }
    }

    pub fn value_of(self, movie: &Movie) -> CursorValue {
        match self {
            SortField::Id => CursorValue::Int(movie.id),
            SortField::Title => CursorValue::Text(movie.title.clone()),
            SortField::LikeCount => CursorValue::Int(movie.like_count),
            SortField::DislikeCount => CursorValue::Int(movie.dislike_count),
        }
    }

    fn accepts(self, value: &CursorValue) -> bool {
        matches!(
            (self, value),
            (SortField::Title, CursorValue::Text(_))
                | (SortField::Id | SortField::LikeCount | SortField::DislikeCount, CursorValue::Int(_))
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn name(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }

    /// Comparison selecting rows that come after a boundary value.
    fn seek_op(self) -> Comparison {
        match self {
            Direction::Asc => Comparison::Gt,
            Direction::Desc => Comparison::Lt,
        }
    }
}

/// One `field_DIRECTION` entry of an ordering spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderKey {
    pub field: SortField,
    pub direction: Direction,
}

impl FromStr for OrderKey {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid = || AppError::BadRequest(format!("invalid order `{raw}`, expected field_ASC or field_DESC"));
        let (field, direction) = raw.rsplit_once('_').ok_or_else(invalid)?;
        let field = SortField::parse(field).ok_or_else(invalid)?;
        let direction = match direction.to_ascii_uppercase().as_str() {
            "ASC" => Direction::Asc,
            "DESC" => Direction::Desc,
            _ => return Err(invalid()),
        };
        Ok(Self { field, direction })
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.field.name(), self.direction.name())
    }
}

/// Value of one ordering key on a boundary row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CursorValue {
    Int(i64),
    Text(String),
}

#[derive(Serialize, Deserialize)]
struct CursorPayload {
    values: BTreeMap<String, CursorValue>,
    order: Vec<String>,
}

/// Client-supplied paging parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageRequest {
    pub cursor: Option<String>,
    #[serde(default)]
    pub order: Vec<String>,
    pub take: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Gt,
    Lt,
}

impl Comparison {
    pub fn sql(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Gt => ">",
            Comparison::Lt => "<",
        }
    }
}

/// `field op value`, one conjunct of a seek predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct SeekTerm<'a> {
    pub field: SortField,
    pub op: Comparison,
    pub value: &'a CursorValue,
}

/// A bounded, deterministic query window.
#[derive(Debug, Clone, PartialEq)]
pub struct PageWindow {
    order: Vec<OrderKey>,
    /// Boundary tuple aligned with `order`; `None` starts at the beginning
    after: Option<Vec<CursorValue>>,
    take: i64,
}

impl PageWindow {
    /// Builds the window for a request.
    ///
    /// A decodable cursor carries its own ordering, which wins over the
    /// requested one so the iteration that produced it resumes unchanged.
    /// An absent or malformed cursor starts at the beginning.
    pub fn from_request(request: &PageRequest) -> Result<Self> {
        let take = request.take.unwrap_or(DEFAULT_TAKE).clamp(1, MAX_TAKE);
        let requested = parse_order(&request.order)?;

        Ok(match request.cursor.as_deref().and_then(decode_cursor) {
            Some((order, values)) => Self { order, after: Some(values), take },
            None => Self { order: requested, after: None, take },
        })
    }

    pub fn order(&self) -> &[OrderKey] {
        &self.order
    }

    pub fn take(&self) -> i64 {
        self.take
    }

    pub fn is_resumed(&self) -> bool {
        self.after.is_some()
    }

    /// "Strictly after the boundary tuple" as a disjunction of conjunctions.
    ///
    /// For keys `k1..kn` the i-th disjunct is
    /// `k1 = v1 AND .. AND k(i-1) = v(i-1) AND ki op vi`, where `op` is `>`
    /// for ascending keys and `<` for descending ones. Empty when the window
    /// starts at the beginning.
    pub fn seek_terms(&self) -> Vec<Vec<SeekTerm<'_>>> {
        let Some(values) = &self.after else {
            return Vec::new();
        };

        (0..self.order.len())
            .map(|i| {
                let mut conjunction: Vec<SeekTerm<'_>> = self.order[..i]
                    .iter()
                    .zip(values)
                    .map(|(key, value)| SeekTerm { field: key.field, op: Comparison::Eq, value })
                    .collect();
                let key = self.order[i];
                conjunction.push(SeekTerm { field: key.field, op: key.direction.seek_op(), value: &values[i] });
                conjunction
            })
            .collect()
    }

    /// Encodes the cursor resuming after `last`, the final row of this page.
    pub fn next_cursor(&self, last: Option<&Movie>) -> Option<String> {
        let last = last?;
        let payload = CursorPayload {
            values: self
                .order
                .iter()
                .map(|key| (key.field.name().to_string(), key.field.value_of(last)))
                .collect(),
            order: self.order.iter().map(ToString::to_string).collect(),
        };
        let json = serde_json::to_vec(&payload).ok()?;
        Some(URL_SAFE_NO_PAD.encode(json))
    }
}

fn parse_order(raw: &[String]) -> Result<Vec<OrderKey>> {
    if raw.is_empty() {
        return Ok(vec![DEFAULT_ORDER.parse()?]);
    }

    let mut keys: Vec<OrderKey> = Vec::with_capacity(raw.len());
    for entry in raw {
        let key: OrderKey = entry.parse()?;
        if keys.iter().any(|existing| existing.field == key.field) {
            return Err(AppError::BadRequest(format!("order field `{}` given twice", key.field.name())));
        }
        keys.push(key);
    }
    Ok(keys)
}

fn decode_cursor(raw: &str) -> Option<(Vec<OrderKey>, Vec<CursorValue>)> {
    let bytes = URL_SAFE_NO_PAD.decode(raw.trim_end_matches('=')).ok()?;
    let payload: CursorPayload = serde_json::from_slice(&bytes).ok()?;
    let order = parse_order(&payload.order).ok()?;
    let values = order
        .iter()
        .map(|key| payload.values.get(key.field.name()).filter(|v| key.field.accepts(v)).cloned())
        .collect::<Option<Vec<_>>>()?;
    Some((order, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuditFields;

    fn movie(id: i64, title: &str, like_count: i64) -> Movie {
        Movie {
            id,
            title: title.to_string(),
            creator_id: 1,
            director_id: 1,
            detail_id: id,
            like_count,
            dislike_count: 0,
            movie_file_path: format!("public/movie/{id}.mp4"),
            audit: AuditFields::new(chrono::Utc::now()),
        }
    }

    fn request(order: &[&str], cursor: Option<String>) -> PageRequest {
        PageRequest {
            cursor,
            order: order.iter().map(|s| s.to_string()).collect(),
            take: Some(3),
        }
    }

    #[test]
    fn defaults_to_id_desc_from_the_start() {
        let window = PageWindow::from_request(&PageRequest::default()).unwrap();
        assert_eq!(window.order(), &[OrderKey { field: SortField::Id, direction: Direction::Desc }]);
        assert_eq!(window.take(), DEFAULT_TAKE);
        assert!(!window.is_resumed());
        assert!(window.seek_terms().is_empty());
    }

    #[test]
    fn rejects_unknown_fields_and_directions() {
        for bad in ["secret_DESC", "id_SIDEWAYS", "id", "id_ASC_DESC"] {
            let err = PageWindow::from_request(&request(&[bad], None)).unwrap_err();
            assert_eq!(err.kind(), "bad_request", "{bad}");
        }
        let err = PageWindow::from_request(&request(&["id_ASC", "id_DESC"], None)).unwrap_err();
        assert_eq!(err.kind(), "bad_request");
    }

    #[test]
    fn direction_is_case_insensitive() {
        let key: OrderKey = "likeCount_desc".parse().unwrap();
        assert_eq!(key.to_string(), "likeCount_DESC");
    }

    #[test]
    fn take_is_clamped() {
        let mut req = PageRequest { take: Some(0), ..Default::default() };
        assert_eq!(PageWindow::from_request(&req).unwrap().take(), 1);
        req.take = Some(10_000);
        assert_eq!(PageWindow::from_request(&req).unwrap().take(), MAX_TAKE);
    }

    #[test]
    fn malformed_cursor_starts_from_the_beginning() {
        for junk in ["%%%", "bm90IGpzb24", "eyJ2YWx1ZXMiOnt9LCJvcmRlciI6WyJpZF9ERVNDIl19"] {
            let window = PageWindow::from_request(&request(&["id_ASC"], Some(junk.to_string()))).unwrap();
            assert!(!window.is_resumed(), "{junk}");
            assert_eq!(window.order()[0].direction, Direction::Asc);
        }
    }

    #[test]
    fn next_cursor_resumes_after_the_last_row() {
        let first = PageWindow::from_request(&request(&["likeCount_DESC", "id_ASC"], None)).unwrap();
        let cursor = first.next_cursor(Some(&movie(7, "Heat", 12))).unwrap();

        let second = PageWindow::from_request(&request(&[], Some(cursor))).unwrap();
        assert!(second.is_resumed());
        assert_eq!(second.order(), first.order());

        let terms = second.seek_terms();
        assert_eq!(terms.len(), 2);
        assert_eq!(
            terms[0],
            vec![SeekTerm { field: SortField::LikeCount, op: Comparison::Lt, value: &CursorValue::Int(12) }]
        );
        assert_eq!(
            terms[1],
            vec![
                SeekTerm { field: SortField::LikeCount, op: Comparison::Eq, value: &CursorValue::Int(12) },
                SeekTerm { field: SortField::Id, op: Comparison::Gt, value: &CursorValue::Int(7) },
            ]
        );
    }

    #[test]
    fn cursor_with_wrongly_typed_value_is_ignored() {
        let payload = r#"{"values":{"title":5},"order":["title_ASC"]}"#;
        let cursor = URL_SAFE_NO_PAD.encode(payload);
        let window = PageWindow::from_request(&request(&[], Some(cursor))).unwrap();
        assert!(!window.is_resumed());
    }

    #[test]
    fn empty_page_has_no_next_cursor() {
        let window = PageWindow::from_request(&PageRequest::default()).unwrap();
        assert_eq!(window.next_cursor(None), None);
    }
}
