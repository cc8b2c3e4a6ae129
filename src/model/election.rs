use serde::{Deserialize, Serialize};

/// Which legislative chamber a list or vote line pertains to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Office {
    #[serde(rename = "DIPUTADOS")]
    LowerChamber,
    #[serde(rename = "SENADORES")]
    UpperChamber,
}

impl Office {
    /// Parse the wire value for an office. Anything outside the two-value
    /// enumeration is rejected.
    pub fn parse(value: &str) -> Result<Office, InvalidOffice> {
        match value {
            "DIPUTADOS" => Ok(Office::LowerChamber),
            "SENADORES" => Ok(Office::UpperChamber),
            other => Err(InvalidOffice(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Office::LowerChamber => "DIPUTADOS",
            Office::UpperChamber => "SENADORES",
        }
    }

    /// Column of `tally_votes` holding this office's counts.
    pub fn vote_column(&self) -> &'static str {
        match self {
            Office::LowerChamber => "lower_votes",
            Office::UpperChamber => "upper_votes",
        }
    }
}

impl std::fmt::Display for Office {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid office: {0} (expected DIPUTADOS or SENADORES)")]
pub struct InvalidOffice(pub String);

/// One list's counts inside a proposed tally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteLineInput {
    #[serde(rename = "listId")]
    pub list_id: i64,
    #[serde(rename = "lowerChamberVotes")]
    pub lower_votes: i64,
    #[serde(rename = "upperChamberVotes")]
    pub upper_votes: i64,
}

/// A proposed telegrama for one polling station, as submitted by an operator
/// or a batch import file. Counts are validated (non-negative, within station
/// capacity) before anything is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TallyInput {
    #[serde(rename = "blankVotes")]
    pub blank_votes: i64,
    #[serde(rename = "nullVotes")]
    pub null_votes: i64,
    #[serde(rename = "contestedVotes")]
    pub contested_votes: i64,
    pub operator: String,
    pub lines: Vec<VoteLineInput>,
}

impl TallyInput {
    /// Total ballots this tally accounts for: every vote-line office field
    /// plus the blank/null/contested categories.
    pub fn total_votes(&self) -> i64 {
        let line_sum: i64 = self
            .lines
            .iter()
            .map(|l| l.lower_votes + l.upper_votes)
            .sum();
        line_sum + self.blank_votes + self.null_votes + self.contested_votes
    }
}
