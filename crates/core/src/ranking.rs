//! Relevance ordering of cards, boards and labels.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::domain::board::{Board, Label};
use crate::domain::card::Card;
use crate::domain::{known_instant, MemberId};

/// Compares two cards for the given viewer. `Less` means `left` is more
/// relevant. Criteria are tried in order and the first decisive one wins:
///
/// 1. assigned to the viewer
/// 2. earlier due date (cards without one lose)
/// 3. more votes
/// 4. lower position, only when both cards share a list
/// 5. more recent board activity, only when both boards report it
/// 6. earlier own last activity (cards without one lose)
///
/// Criterion 4 makes this a partial order, so it must not be handed to
/// `slice::sort_by`; use [`rank_cards`].
pub fn compare_relevance(left: &Card, right: &Card, viewer: &MemberId) -> Ordering {
    let criteria: [fn(&Card, &Card, &MemberId) -> bool; 6] = [
        assigned_first,
        due_first,
        votes_first,
        position_first,
        board_activity_first,
        own_activity_first,
    ];
    for criterion in criteria {
        if criterion(left, right, viewer) {
            return Ordering::Less;
        }
        if criterion(right, left, viewer) {
            return Ordering::Greater;
        }
    }
    Ordering::Equal
}

/// Orders cards most relevant first without touching the input. Each card
/// is inserted after every already placed card it does not beat, which
/// keeps the result deterministic for any comparator outcome.
pub fn rank_cards(cards: &[Card], viewer: &MemberId) -> Vec<Card> {
    let mut ranked: Vec<&Card> = Vec::with_capacity(cards.len());
    for card in cards {
        let mut index = ranked.len();
        while index > 0 && compare_relevance(card, ranked[index - 1], viewer) == Ordering::Less {
            index -= 1;
        }
        ranked.insert(index, card);
    }
    ranked.into_iter().cloned().collect()
}

pub fn labels_by_usage(labels: &[Label]) -> Vec<Label> {
    let mut sorted = labels.to_vec();
    sorted.sort_by(|left, right| {
        right.uses.cmp(&left.uses).then_with(|| left.name.is_empty().cmp(&right.name.is_empty()))
    });
    sorted
}

pub fn boards_by_recency(boards: &[Board]) -> Vec<Board> {
    let mut sorted = boards.to_vec();
    sorted.sort_by_key(|board| std::cmp::Reverse(board_recency(board)));
    sorted
}

fn board_recency(board: &Board) -> i64 {
    board
        .date_last_activity
        .or(board.date_last_view)
        .map(|instant| instant.timestamp())
        .unwrap_or_default()
}

fn assigned_first(left: &Card, right: &Card, viewer: &MemberId) -> bool {
    left.is_assigned_to(viewer) && !right.is_assigned_to(viewer)
}

fn due_first(left: &Card, right: &Card, _viewer: &MemberId) -> bool {
    earlier_known(known_instant(left.due), known_instant(right.due))
}

fn votes_first(left: &Card, right: &Card, _viewer: &MemberId) -> bool {
    left.vote_count() > right.vote_count()
}

fn position_first(left: &Card, right: &Card, _viewer: &MemberId) -> bool {
    left.id_list == right.id_list && left.pos < right.pos
}

fn board_activity_first(left: &Card, right: &Card, _viewer: &MemberId) -> bool {
    let activity =
        |card: &Card| card.board.as_ref().and_then(|board| known_instant(board.date_last_activity));
    match (activity(left), activity(right)) {
        (Some(left), Some(right)) => left > right,
        _ => false,
    }
}

fn own_activity_first(left: &Card, right: &Card, _viewer: &MemberId) -> bool {
    earlier_known(known_instant(left.date_last_activity), known_instant(right.date_last_activity))
}

fn earlier_known(left: Option<DateTime<Utc>>, right: Option<DateTime<Utc>>) -> bool {
    match (left, right) {
        (Some(left), Some(right)) => left < right,
        (Some(_), None) => true,
        _ => false,
    }
}
