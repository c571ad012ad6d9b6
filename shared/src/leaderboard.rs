use std::cmp::Ordering;
use std::fmt;

use serde::de::{self, Unexpected, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Marker value a score takes when a user is on the roster but outside the
/// top-N scoreboard.
pub const UNRANKED_MARKER: &str = "unranked";

pub type Leaderboard = Vec<RankedEntry>;

/// A competitor's score: either the points reported by the scoreboard, or
/// the unranked marker for roster members outside the top N.
///
/// Serialized as a bare JSON number or the string `"unranked"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Points(i64),
    Unranked,
}

impl Score {
    /// Total order used for the published leaderboard: numeric scores come
    /// first, higher points ahead of lower. Two unranked scores compare
    /// equal; their relative order is owed to sort stability, so callers
    /// must use a stable sort.
    pub fn ranking_cmp(&self, other: &Score) -> Ordering {
        match (self, other) {
            (Score::Points(a), Score::Points(b)) => b.cmp(a),
            (Score::Points(_), Score::Unranked) => Ordering::Less,
            (Score::Unranked, Score::Points(_)) => Ordering::Greater,
            (Score::Unranked, Score::Unranked) => Ordering::Equal,
        }
    }

    pub fn is_unranked(&self) -> bool {
        matches!(self, Score::Unranked)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Points(points) => write!(f, "{points}"),
            Score::Unranked => f.write_str(UNRANKED_MARKER),
        }
    }
}

impl Serialize for Score {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Score::Points(points) => serializer.serialize_i64(*points),
            Score::Unranked => serializer.serialize_str(UNRANKED_MARKER),
        }
    }
}

impl<'de> Deserialize<'de> for Score {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ScoreVisitor;

        impl Visitor<'_> for ScoreVisitor {
            type Value = Score;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer score or the string \"unranked\"")
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Score, E> {
                Ok(Score::Points(value))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Score, E> {
                i64::try_from(value)
                    .map(Score::Points)
                    .map_err(|_| E::invalid_value(Unexpected::Unsigned(value), &self))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Score, E> {
                if value == UNRANKED_MARKER {
                    Ok(Score::Unranked)
                } else {
                    Err(E::invalid_value(Unexpected::Str(value), &self))
                }
            }
        }

        deserializer.deserialize_any(ScoreVisitor)
    }
}

/// One row of the published leaderboard. `rank` is the 1-based position in
/// the final sorted sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub name: String,
    pub score: Score,
    pub rank: u32,
}

/// The complete published artifact: replaced as a whole on every successful
/// refresh, never patched. `seq` increases with each publication and drives
/// cache validation on the read paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardState {
    #[serde(default)]
    pub seq: u64,
    pub fetched_at: String,
    pub entries: Leaderboard,
}
