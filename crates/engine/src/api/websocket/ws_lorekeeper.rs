//! Lore-keeper interaction: delayed engagement greetings, keyword dialogue,
//! puzzle solving, and the glow-codex flow.

use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex_lite::Regex;

use driftmere_domain::{ConnectionId, LoreKeeper, PlayerId, RoomId};
use driftmere_shared::ServerMessage;

use crate::api::scheduler;
use crate::api::session_state::GlowCodexState;

use super::{error_response, WsState};

const DEFAULT_NPC_COLOR: &str = "#ffffff";
const CLUE_BURST_INTERVAL_MS: u64 = 1_000;

// =============================================================================
// Engagement
// =============================================================================

/// Arm one-shot engagement timers for every keeper in the room the player
/// has not yet been greeted by. Prior pending engagements are cancelled
/// first (the player may have re-entered before a timer fired).
pub(super) async fn arm_engagements(state: &WsState, connection_id: ConnectionId, room_id: RoomId) {
    state
        .registry
        .with_timers(connection_id, |timers| timers.cancel_engagements())
        .await;

    let Some(session) = state.registry.get(connection_id).await else {
        return;
    };
    let keepers = match state.app.repos.npc.lore_keepers_in_room(room_id).await {
        Ok(keepers) => keepers,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list lore keepers");
            return;
        }
    };

    for keeper in keepers {
        if !keeper.engagement_enabled || keeper.initial_message.is_none() {
            continue;
        }
        let greeted = state
            .app
            .repos
            .lore
            .has_been_greeted(session.player_id, keeper.npc_id)
            .await
            .unwrap_or(true);
        if greeted {
            continue;
        }

        let task_state = state.clone();
        let player_id = session.player_id;
        let delay = keeper.engagement_delay_ms;
        let handle = scheduler::schedule(delay, async move {
            deliver_engagement(task_state, connection_id, player_id, room_id, keeper).await;
        });
        state
            .registry
            .with_timers(connection_id, |timers| timers.engagement.push(handle))
            .await;
    }
}

/// Fired engagement timer: re-verify the session is still here, then greet.
async fn deliver_engagement(
    state: WsState,
    connection_id: ConnectionId,
    player_id: PlayerId,
    room_id: RoomId,
    keeper: LoreKeeper,
) {
    let Some(session) = state.registry.get(connection_id).await else {
        return;
    };
    if session.room_id != room_id || !state.registry.is_open(connection_id).await {
        return;
    }
    // Re-check: another window may have been greeted meanwhile.
    match state
        .app
        .repos
        .lore
        .has_been_greeted(player_id, keeper.npc_id)
        .await
    {
        Ok(false) => {}
        _ => return,
    }
    if let Err(e) = state
        .app
        .repos
        .lore
        .mark_greeted(player_id, keeper.npc_id)
        .await
    {
        tracing::error!(error = %e, "Failed to record greeting");
        return;
    }
    let Some(message) = keeper.initial_message.clone() else {
        return;
    };
    state
        .registry
        .to_player(connection_id, keeper_message(&keeper, &message))
        .await;
}

// =============================================================================
// Talk
// =============================================================================

pub(super) async fn handle_talk(
    state: &WsState,
    connection_id: ConnectionId,
    message: &str,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;

    // Room speech first; keepers react afterwards.
    state
        .registry
        .to_room(
            session.room_id,
            ServerMessage::Talked {
                player_name: session.player_name.clone(),
                message: message.to_string(),
            },
            None,
        )
        .await;

    let keepers = state
        .app
        .repos
        .npc
        .lore_keepers_in_room(session.room_id)
        .await
        .unwrap_or_default();

    // An active glow-codex puzzle captures every talk from this session.
    if let Some(glow) = session.glow_codex.as_ref() {
        match keepers.iter().find(|k| k.npc_id == glow.npc_id) {
            Some(keeper) => {
                let keeper = keeper.clone();
                classify_glow_attempt(state, connection_id, &keeper, message).await;
                return None;
            }
            None => {
                // The keeper is gone; the puzzle dissolves.
                state
                    .registry
                    .update(connection_id, |info| info.glow_codex = None)
                    .await;
            }
        }
    }

    for keeper in &keepers {
        // A talk can solve a puzzle outright.
        if let Some(puzzle) = keeper.puzzle.as_ref() {
            let trimmed = message.trim();
            let named = keeper.is_addressed_by(message);
            let exact = trimmed.eq_ignore_ascii_case(&puzzle.solution);
            let mentioned = named
                && message
                    .to_lowercase()
                    .contains(&puzzle.solution.to_lowercase());
            if exact || mentioned {
                solve_success(state, connection_id, keeper).await;
                continue;
            }
            // First address of a glow-codex keeper starts the clue burst.
            if keeper.is_glow_codex() && named && session.glow_codex.is_none() {
                begin_glow_codex(state, connection_id, keeper).await;
                classify_glow_attempt(state, connection_id, keeper, message).await;
                continue;
            }
        }

        // Keyword dialogue: first match wins, one reply per keeper.
        if let Some(entry) = keeper.match_keyword(message) {
            state
                .registry
                .to_room(
                    session.room_id,
                    keeper_message(keeper, &entry.response),
                    None,
                )
                .await;
        } else if keeper.is_addressed_by(message) {
            if let Some(incorrect) = keeper.incorrect_response.as_ref() {
                state
                    .registry
                    .to_room(session.room_id, keeper_message(keeper, incorrect), None)
                    .await;
            }
        }
    }

    None
}

pub(super) async fn handle_ask(
    state: &WsState,
    connection_id: ConnectionId,
    target: &str,
    message: &str,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let keeper = match find_keeper(state, session.room_id, target).await {
        Ok(keeper) => keeper,
        Err(response) => return Some(response),
    };

    if let Some(puzzle) = keeper.puzzle.as_ref() {
        if message
            .to_lowercase()
            .contains(&puzzle.solution.to_lowercase())
        {
            solve_success(state, connection_id, &keeper).await;
            return None;
        }
    }

    if let Some(entry) = keeper.match_keyword(message) {
        state
            .registry
            .to_room(session.room_id, keeper_message(&keeper, &entry.response), None)
            .await;
    } else if let Some(incorrect) = keeper.incorrect_response.as_ref() {
        state
            .registry
            .to_room(session.room_id, keeper_message(&keeper, incorrect), None)
            .await;
    }
    None
}

// =============================================================================
// Solve / Clue / Greet
// =============================================================================

pub(super) async fn handle_solve(
    state: &WsState,
    connection_id: ConnectionId,
    target: &str,
    answer: &str,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let keeper = match find_keeper(state, session.room_id, target).await {
        Ok(keeper) => keeper,
        Err(response) => return Some(response),
    };
    let Some(puzzle) = keeper.puzzle.as_ref() else {
        return Some(error_response(&format!(
            "{} has no puzzle to solve",
            keeper.name
        )));
    };

    if answer.trim().eq_ignore_ascii_case(&puzzle.solution) {
        solve_success(state, connection_id, &keeper).await;
        None
    } else {
        let failure = puzzle
            .failure_message
            .clone()
            .unwrap_or_else(|| "That is not the answer.".to_string());
        Some(keeper_message(&keeper, &failure))
    }
}

pub(super) async fn handle_clue(
    state: &WsState,
    connection_id: ConnectionId,
    target: &str,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let keeper = match find_keeper(state, session.room_id, target).await {
        Ok(keeper) => keeper,
        Err(response) => return Some(response),
    };
    match keeper.clue_for(state.app.now_ms()) {
        Some(clue) => Some(keeper_message(&keeper, clue)),
        None => Some(error_response(&format!(
            "{} has no clues to offer",
            keeper.name
        ))),
    }
}

pub(super) async fn handle_greet(
    state: &WsState,
    connection_id: ConnectionId,
    target: &str,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let keeper = match find_keeper(state, session.room_id, target).await {
        Ok(keeper) => keeper,
        Err(response) => return Some(response),
    };
    let Some(message) = keeper.initial_message.clone() else {
        return Some(error_response(&format!(
            "{} does not acknowledge you",
            keeper.name
        )));
    };
    let _ = state
        .app
        .repos
        .lore
        .mark_greeted(session.player_id, keeper.npc_id)
        .await;
    Some(keeper_message(&keeper, &message))
}

// =============================================================================
// Glow codex
// =============================================================================

/// Bind the session to the keeper's puzzle and push every clue at one
/// second intervals.
async fn begin_glow_codex(state: &WsState, connection_id: ConnectionId, keeper: &LoreKeeper) {
    let npc_id = keeper.npc_id;
    state
        .registry
        .update(connection_id, |info| {
            info.glow_codex = Some(GlowCodexState { npc_id });
        })
        .await;

    let Some(puzzle) = keeper.puzzle.clone() else {
        return;
    };
    let Some(session) = state.registry.get(connection_id).await else {
        return;
    };
    let room_id = session.room_id;
    let task_state = state.clone();
    let keeper = keeper.clone();
    let handle = tokio::spawn(async move {
        for clue in &puzzle.clues {
            tokio::time::sleep(Duration::from_millis(CLUE_BURST_INTERVAL_MS)).await;
            // The burst dies quietly once the puzzle or the room changes.
            let Some(session) = task_state.registry.get(connection_id).await else {
                return;
            };
            let still_bound = session
                .glow_codex
                .as_ref()
                .is_some_and(|g| g.npc_id == keeper.npc_id);
            if !still_bound || session.room_id != room_id {
                return;
            }
            task_state
                .registry
                .to_player(connection_id, keeper_message(&keeper, clue))
                .await;
        }
    })
    .abort_handle();
    state
        .registry
        .with_timers(connection_id, |timers| {
            if let Some(old) = timers.clue_burst.take() {
                old.abort();
            }
            timers.clue_burst = Some(handle);
        })
        .await;
}

/// Three-way classifier for talk while a glow-codex puzzle is active.
async fn classify_glow_attempt(
    state: &WsState,
    connection_id: ConnectionId,
    keeper: &LoreKeeper,
    message: &str,
) {
    let Some(puzzle) = keeper.puzzle.as_ref() else {
        return;
    };
    let trimmed = message.trim();

    if trimmed.eq_ignore_ascii_case(&puzzle.solution) {
        solve_success(state, connection_id, keeper).await;
        return;
    }

    let reply = if is_interrogative(trimmed) {
        sample(
            state,
            &[&puzzle.hint_responses, &puzzle.followup_responses],
            "The glow shifts, revealing nothing new.",
        )
    } else if trimmed.chars().any(char::is_alphabetic) {
        sample(
            state,
            &[&puzzle.incorrect_responses, &puzzle.followup_responses],
            "That is not the word.",
        )
    } else {
        sample(
            state,
            &[&puzzle.followup_responses],
            "The glow waits, patient.",
        )
    };
    state
        .registry
        .to_player(connection_id, keeper_message(keeper, &reply))
        .await;
}

fn is_interrogative(message: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(help|hint|what|how|where|who|why|lost|stuck|confused)\b").ok()
    });
    message.contains('?')
        || pattern
            .as_ref()
            .is_some_and(|re| re.is_match(message))
}

/// Pick a random line from the first non-empty pool, else the default.
fn sample(state: &WsState, pools: &[&Vec<String>], default: &str) -> String {
    for pool in pools {
        if !pool.is_empty() {
            let index = state.app.random.gen_index(pool.len());
            if let Some(line) = pool.get(index) {
                return line.clone();
            }
        }
    }
    default.to_string()
}

// =============================================================================
// Success & award eligibility
// =============================================================================

/// The puzzle success branch: broadcast the success message, consult award
/// eligibility, clear any bound glow-codex state.
async fn solve_success(state: &WsState, connection_id: ConnectionId, keeper: &LoreKeeper) {
    let Some(session) = state.registry.get(connection_id).await else {
        return;
    };
    let Some(puzzle) = keeper.puzzle.as_ref() else {
        return;
    };

    state
        .registry
        .to_room(
            session.room_id,
            keeper_message(keeper, &puzzle.success_message),
            None,
        )
        .await;

    state
        .registry
        .update(connection_id, |info| {
            if info
                .glow_codex
                .as_ref()
                .is_some_and(|g| g.npc_id == keeper.npc_id)
            {
                info.glow_codex = None;
            }
        })
        .await;

    let Some(reward) = puzzle.reward_item.as_ref() else {
        return;
    };

    let last = match state
        .app
        .repos
        .lore
        .last_item_award_time(session.player_id, keeper.npc_id, reward)
        .await
    {
        Ok(last) => last,
        Err(e) => {
            tracing::error!(error = %e, "Award history lookup failed");
            return;
        }
    };
    let now = state.app.clock.now();
    match award_decision(
        puzzle.award_once,
        puzzle.award_after_delay,
        puzzle.delay_seconds,
        last,
        now,
    ) {
        AwardDecision::Award => {
            if let Err(e) = state
                .app
                .repos
                .lore
                .record_item_award(session.player_id, keeper.npc_id, reward, now)
                .await
            {
                tracing::error!(error = %e, "Failed to record item award");
                return;
            }
            if let Err(e) = state
                .app
                .repos
                .item
                .add_player_item(session.player_id, reward, 1)
                .await
            {
                tracing::error!(error = %e, "Failed to grant award item");
                return;
            }
            state
                .registry
                .to_player(
                    connection_id,
                    ServerMessage::Message {
                        message: format!("{} gives you a {reward}.", keeper.name),
                        html: None,
                    },
                )
                .await;
        }
        AwardDecision::DenySilent => {}
        AwardDecision::DenyWait(seconds) => {
            state
                .registry
                .to_player(
                    connection_id,
                    ServerMessage::Message {
                        message: format!(
                            "You must wait {seconds} more seconds before receiving another reward."
                        ),
                        html: None,
                    },
                )
                .await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum AwardDecision {
    Award,
    DenySilent,
    DenyWait(i64),
}

/// The award eligibility rule.
pub(super) fn award_decision(
    once_only: bool,
    after_delay: bool,
    delay_seconds: i64,
    last_award: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> AwardDecision {
    if !once_only && !after_delay {
        return AwardDecision::Award;
    }
    let Some(last) = last_award else {
        return AwardDecision::Award;
    };
    if once_only {
        return AwardDecision::DenySilent;
    }
    let elapsed = (now - last).num_seconds();
    if after_delay && elapsed >= delay_seconds {
        AwardDecision::Award
    } else {
        AwardDecision::DenyWait((delay_seconds - elapsed).max(0))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn keeper_message(keeper: &LoreKeeper, message: &str) -> ServerMessage {
    ServerMessage::LoreKeeperMessage {
        npc_name: keeper.name.clone(),
        npc_color: keeper
            .initial_color
            .clone()
            .unwrap_or_else(|| DEFAULT_NPC_COLOR.to_string()),
        message: message.to_string(),
        message_color: DEFAULT_NPC_COLOR.to_string(),
        keyword_color: keeper
            .keyword_color
            .clone()
            .unwrap_or_else(|| DEFAULT_NPC_COLOR.to_string()),
    }
}

/// Partial-match a keeper by name in the room.
async fn find_keeper(
    state: &WsState,
    room_id: RoomId,
    target: &str,
) -> Result<LoreKeeper, ServerMessage> {
    let keepers = state
        .app
        .repos
        .npc
        .lore_keepers_in_room(room_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list lore keepers");
            error_response("Nobody here answers")
        })?;
    let needle = target.trim().to_lowercase();
    let mut matches: Vec<LoreKeeper> = keepers
        .into_iter()
        .filter(|k| k.name.to_lowercase().contains(&needle))
        .collect();
    match matches.len() {
        0 => Err(error_response(&format!("You don't see '{target}' here"))),
        1 => Ok(matches.remove(0)),
        _ => {
            let names: Vec<String> = matches.iter().map(|k| k.name.clone()).collect();
            Err(error_response(&format!(
                "Which do you mean: {}?",
                names.join(", ")
            )))
        }
    }
}
