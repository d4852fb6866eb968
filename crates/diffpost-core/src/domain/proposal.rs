//! Proposal identity and branch naming.
//!
//! A proposal is identified by who submitted it, when, and a free-form title.
//! The identity travels as a structured record; it is flattened into a branch
//! name only at the hosting boundary:
//!
//! ```text
//! <submitter_id>--<dd-mm-yy-HH-MM-SS>--<title-slug>
//! ```
//!
//! Parsing splits on the first two separators only, so a `--` inside the title
//! never bleeds into the id or timestamp fields.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const BRANCH_SEPARATOR: &str = "--";
pub const UNNAMED_TITLE: &str = "unnamed";

const BRANCH_TIMESTAMP_FORMAT: &str = "%d-%m-%y-%H-%M-%S";
const DISPLAY_TIMESTAMP_FORMAT: &str = "%d/%m/%y %H:%M:%S";

/// The chat user behind a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submitter {
    pub id: u64,
    pub name: String,
    pub account_created_at: DateTime<Utc>,
}

impl Submitter {
    pub fn new(id: u64, name: impl Into<String>, account_created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            account_created_at,
        }
    }

    pub fn account_age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.account_created_at
    }
}

/// Structured identity of a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalId {
    submitter_id: u64,
    created_at: DateTime<Utc>,
    title: String,
}

impl ProposalId {
    /// Build an id. The title is stored in its branch-safe slug form, so
    /// blank or missing titles become `unnamed`; the timestamp is truncated to
    /// whole seconds, the resolution of the branch name.
    pub fn new(submitter_id: u64, created_at: DateTime<Utc>, title: Option<&str>) -> Self {
        Self {
            submitter_id,
            created_at: created_at.trunc_subsecs(0),
            title: slugify(title.unwrap_or_default()),
        }
    }

    pub fn submitter_id(&self) -> u64 {
        self.submitter_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Branch name on the hosting side.
    pub fn branch_name(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.submitter_id,
            self.created_at.format(BRANCH_TIMESTAMP_FORMAT),
            self.title,
            sep = BRANCH_SEPARATOR,
        )
    }

    /// Recover an id from a branch name produced by [`ProposalId::branch_name`].
    ///
    /// Returns `None` for branches that do not follow the naming scheme.
    pub fn parse_branch(branch: &str) -> Option<Self> {
        let mut parts = branch.splitn(3, BRANCH_SEPARATOR);
        let submitter_id = parts.next()?.parse::<u64>().ok()?;
        let timestamp = parts.next()?;
        let title = parts.next().filter(|t| !t.is_empty())?;
        let created_at = NaiveDateTime::parse_from_str(timestamp, BRANCH_TIMESTAMP_FORMAT)
            .ok()?
            .and_utc();
        Some(Self {
            submitter_id,
            created_at,
            title: title.to_string(),
        })
    }

    /// Human readable label, e.g. `fire-trails by 1234 at 05/01/24 13:45:09`.
    pub fn describe(&self, author: &str) -> String {
        format!(
            "{} by {} at {}",
            self.title,
            author,
            self.created_at.format(DISPLAY_TIMESTAMP_FORMAT)
        )
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.branch_name())
    }
}

/// Keep letters, digits and `_`; every other run becomes a single `-`.
fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_alphanumeric() || c == '_' {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        UNNAMED_TITLE.to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use rstest::rstest;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 5, h, m, s).unwrap()
    }

    #[test]
    fn branch_name_layout() {
        let id = ProposalId::new(730660371844825149, at(13, 45, 9), Some("fire_trails"));
        assert_eq!(id.branch_name(), "730660371844825149--05-01-24-13-45-09--fire_trails");
    }

    #[test]
    fn missing_or_blank_title_is_unnamed() {
        let id = ProposalId::new(1, at(0, 0, 0), None);
        assert_eq!(id.title(), UNNAMED_TITLE);
        let id = ProposalId::new(1, at(0, 0, 0), Some("   "));
        assert_eq!(id.title(), UNNAMED_TITLE);
        assert!(id.branch_name().ends_with("--unnamed"));
    }

    #[test]
    fn branch_round_trips() {
        let id = ProposalId::new(42, at(23, 59, 58), Some("Sword_2"));
        let parsed = ProposalId::parse_branch(&id.branch_name()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn subseconds_are_dropped() {
        let created = at(1, 2, 3).with_nanosecond(500_000_000).unwrap();
        let id = ProposalId::new(7, created, Some("x"));
        assert_eq!(id.created_at(), at(1, 2, 3));
    }

    #[test]
    fn title_may_contain_separator() {
        let parsed = ProposalId::parse_branch("9--05-01-24-13-45-09--more--dashes").unwrap();
        assert_eq!(parsed.submitter_id(), 9);
        assert_eq!(parsed.created_at(), at(13, 45, 9));
        assert_eq!(parsed.title(), "more--dashes");
    }

    #[test]
    fn title_is_slugged_for_branch() {
        let id = ProposalId::new(3, at(0, 0, 0), Some("  Add a: sword?! "));
        assert_eq!(id.title(), "Add-a-sword");
        assert!(id.branch_name().ends_with("--Add-a-sword"));
        let id = ProposalId::new(3, at(0, 0, 0), Some("???"));
        assert!(id.branch_name().ends_with("--unnamed"));
        let id = ProposalId::new(3, at(0, 0, 0), Some("炎の剣"));
        assert_eq!(id.title(), "炎の剣");
    }

    #[rstest]
    #[case::separator_in_title("more--dashes", "more-dashes")]
    #[case::space_in_title("fire trails", "fire-trails")]
    #[case::non_ascii("剣 2", "剣-2")]
    fn built_ids_round_trip_through_branch(#[case] title: &str, #[case] slug: &str) {
        let id = ProposalId::new(9, at(13, 45, 9), Some(title));
        assert_eq!(id.title(), slug);
        let parsed = ProposalId::parse_branch(&id.branch_name()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn foreign_branches_are_rejected() {
        assert_eq!(ProposalId::parse_branch("master"), None);
        assert_eq!(ProposalId::parse_branch("abc--05-01-24-13-45-09--x"), None);
        assert_eq!(ProposalId::parse_branch("1--yesterday--x"), None);
        assert_eq!(ProposalId::parse_branch("1--05-01-24-13-45-09--"), None);
    }

    #[test]
    fn describe_formats_timestamp() {
        let id = ProposalId::new(5, at(13, 45, 9), Some("fire"));
        assert_eq!(id.describe("vivi"), "fire by vivi at 05/01/24 13:45:09");
    }

    #[test]
    fn account_age_is_relative_to_now() {
        let submitter = Submitter::new(1, "ana", at(0, 0, 0));
        assert_eq!(submitter.account_age(at(1, 0, 0)), chrono::Duration::hours(1));
    }
}
