//! Card search over the actor's most relevant cards.

use std::collections::HashMap;

use tracing::debug;

use crate::cache::{EntityCache, WARM_BOARD_LIMIT};
use crate::domain::board::{Board, List};
use crate::domain::card::Card;
use crate::domain::identity::Actor;
use crate::domain::BoardId;
use crate::errors::CoreError;
use crate::ranking::{boards_by_recency, rank_cards};

pub const DISCOVERY_PAGE_SIZE: usize = 20;
pub const SEARCH_PAGE_SIZE: usize = 5;

#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    pub card: Card,
    pub board: Board,
    pub list: List,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchPage {
    pub hits: Vec<SearchHit>,
    /// Offset to continue a discovery listing from.
    pub next_offset: Option<usize>,
    /// Listing of recent cards rather than a text search.
    pub discovery: bool,
}

/// Ranks the actor's cards and returns the page matching `query`.
///
/// An empty query, or one naming a recently active board, is a discovery
/// listing: larger pages, resumable through `next_offset`. With an empty
/// query, cards in the last list of their board are skipped.
pub async fn discover_cards(
    cache: &EntityCache,
    actor: &Actor,
    query: &str,
    offset: usize,
) -> Result<SearchPage, CoreError> {
    let query = query.trim().to_lowercase();
    let boards = boards_by_recency(&cache.boards(actor).await?);
    let discovery = query.is_empty()
        || boards.iter().take(WARM_BOARD_LIMIT).any(|board| board.name.to_lowercase() == query);
    let page_size = if discovery { DISCOVERY_PAGE_SIZE } else { SEARCH_PAGE_SIZE };

    let board_by_id: HashMap<&BoardId, &Board> =
        boards.iter().map(|board| (&board.id, board)).collect();
    let mut cards = cache.user_cards(actor).await?;
    for card in &mut cards {
        if let Some(board) = board_by_id.get(&card.id_board) {
            card.board = Some((*board).clone());
        }
    }
    let me = cache.me(actor).await?;
    let ranked = rank_cards(&cards, &me.id);

    let mut lists_by_board: HashMap<BoardId, Vec<List>> = HashMap::new();
    let mut hits = Vec::new();
    let mut index = offset;
    while index < ranked.len() && hits.len() < page_size {
        let card = &ranked[index];
        index += 1;

        let Some(board) = board_by_id.get(&card.id_board) else {
            continue;
        };
        if !query.is_empty() && !matches_query(card, board, &query) {
            continue;
        }
        if !lists_by_board.contains_key(&card.id_board) {
            let lists = cache.lists(actor, &card.id_board).await?;
            lists_by_board.insert(card.id_board.clone(), lists);
        }
        let lists = lists_by_board.get(&card.id_board).map(Vec::as_slice).unwrap_or_default();
        let Some(list) = lists.iter().find(|list| list.id == card.id_list) else {
            continue;
        };
        if query.is_empty() && lists.last().is_some_and(|last| last.id == list.id) {
            continue;
        }
        hits.push(SearchHit { card: card.clone(), board: (*board).clone(), list: list.clone() });
    }

    let next_offset = (discovery && index < ranked.len()).then_some(index);
    debug!(
        event_name = "discovery.search.completed",
        user_id = actor.user_id.0,
        discovery,
        offset,
        hits = hits.len(),
        "card search finished"
    );
    Ok(SearchPage { hits, next_offset, discovery })
}

fn matches_query(card: &Card, board: &Board, query: &str) -> bool {
    [board.name.as_str(), card.name.as_str(), card.desc.as_str()]
        .iter()
        .any(|field| field.to_lowercase().contains(query))
}
