//! Lore-keeper decorations: dialogue tables and puzzles.

use serde::{Deserialize, Serialize};

use crate::NpcId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoreKind {
    Dialogue,
    Puzzle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PuzzleMode {
    Word,
    Combination,
    Cipher,
    GlowCodex,
}

/// One keyword → response pair. Matching is case-insensitive substring,
/// first match wins, in authored order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordEntry {
    pub keyword: String,
    pub response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PuzzleConfig {
    pub mode: PuzzleMode,
    pub clues: Vec<String>,
    pub solution: String,
    pub success_message: String,
    pub failure_message: Option<String>,
    pub reward_item: Option<String>,
    pub award_once: bool,
    pub award_after_delay: bool,
    pub delay_seconds: i64,
    /// 1-based character indices into each clue's `<...>` region.
    pub extraction_pattern: Option<Vec<usize>>,
    pub hint_responses: Vec<String>,
    pub followup_responses: Vec<String>,
    pub incorrect_responses: Vec<String>,
}

/// The flattened lore-keeper decoration the repository returns for a
/// lorekeeper NPC standing in a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoreKeeper {
    pub npc_id: NpcId,
    pub name: String,
    pub lore_kind: LoreKind,
    pub engagement_enabled: bool,
    pub engagement_delay_ms: i64,
    pub initial_message: Option<String>,
    pub initial_color: Option<String>,
    pub keywords: Vec<KeywordEntry>,
    pub keyword_color: Option<String>,
    pub incorrect_response: Option<String>,
    pub puzzle: Option<PuzzleConfig>,
}

impl LoreKeeper {
    /// First keyword whose text appears in the message (case-insensitive).
    pub fn match_keyword(&self, message: &str) -> Option<&KeywordEntry> {
        let haystack = message.to_lowercase();
        self.keywords
            .iter()
            .find(|entry| haystack.contains(&entry.keyword.to_lowercase()))
    }

    /// Whether the message mentions the keeper's name or any token of it.
    pub fn is_addressed_by(&self, message: &str) -> bool {
        let haystack = message.to_lowercase();
        let name = self.name.to_lowercase();
        if haystack.contains(&name) {
            return true;
        }
        name.split_whitespace().any(|token| haystack.contains(token))
    }

    /// Clue selected by the shared 30-second wall-clock window.
    pub fn clue_for(&self, now_ms: i64) -> Option<&str> {
        let puzzle = self.puzzle.as_ref()?;
        if puzzle.clues.is_empty() {
            return None;
        }
        let index = (now_ms / 30_000).rem_euclid(puzzle.clues.len() as i64) as usize;
        puzzle.clues.get(index).map(String::as_str)
    }

    pub fn is_glow_codex(&self) -> bool {
        self.puzzle
            .as_ref()
            .is_some_and(|p| p.mode == PuzzleMode::GlowCodex)
    }
}

/// The text inside the first `<...>` region of a clue.
pub fn glow_region(clue: &str) -> Option<&str> {
    let start = clue.find('<')?;
    let rest = &clue[start + 1..];
    let end = rest.find('>')?;
    Some(&rest[..end])
}

/// Check the extraction invariant: concatenating, for each clue, the
/// characters at the 1-based pattern indices inside its `<...>` region must
/// equal the solution, lower-cased. Used by test tooling against authored
/// puzzles.
pub fn verify_extraction_pattern(puzzle: &PuzzleConfig) -> bool {
    let Some(pattern) = puzzle.extraction_pattern.as_ref() else {
        return true;
    };
    let mut extracted = String::new();
    for clue in &puzzle.clues {
        let Some(region) = glow_region(clue) else {
            return false;
        };
        let chars: Vec<char> = region.chars().collect();
        for &index in pattern {
            match index.checked_sub(1).and_then(|i| chars.get(i)) {
                Some(c) => extracted.push(*c),
                None => return false,
            }
        }
    }
    extracted.to_lowercase() == puzzle.solution.to_lowercase()
}
