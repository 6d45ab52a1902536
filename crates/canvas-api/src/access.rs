use canvas_db::Database;
use canvas_db::models::{BoardRow, CardRow};
use canvas_types::api::Claims;

use crate::error::ApiError;

/// The authenticated user a core operation acts on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
}

impl Principal {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

impl From<&Claims> for Principal {
    fn from(claims: &Claims) -> Self {
        Self::new(claims.sub.to_string())
    }
}

/// Load a board the principal owns or is a member of.
///
/// A missing board is `NotFound`; an existing board the principal cannot
/// see is `AccessDenied`.
pub fn resolve_board(db: &Database, principal: &Principal, board_id: &str) -> Result<BoardRow, ApiError> {
    let board = db.get_board(board_id)?.ok_or(ApiError::NotFound("Board"))?;
    if board.owner_id == principal.user_id || db.is_member(&board.id, &principal.user_id)? {
        Ok(board)
    } else {
        Err(ApiError::AccessDenied)
    }
}

/// Like [`resolve_board`], but only the owner passes.
pub fn resolve_owned_board(db: &Database, principal: &Principal, board_id: &str) -> Result<BoardRow, ApiError> {
    let board = resolve_board(db, principal, board_id)?;
    if board.owner_id != principal.user_id {
        return Err(ApiError::AccessDenied);
    }
    Ok(board)
}

/// Load a card and check access through the card's own board.
pub fn resolve_card(db: &Database, principal: &Principal, card_id: &str) -> Result<(CardRow, BoardRow), ApiError> {
    let card = db.get_card(card_id)?.ok_or(ApiError::NotFound("Card"))?;
    let board = resolve_board(db, principal, &card.board_id)?;
    Ok((card, board))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestApp;

    #[test]
    fn missing_board_is_not_found() {
        let app = TestApp::new();
        let err = resolve_board(&app.state.db, &app.owner, "no-such-board").unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn outsider_is_denied_and_member_is_admitted() {
        let app = TestApp::new();
        let board = app.board("Private");

        let err = resolve_board(&app.state.db, &app.outsider, &board).unwrap_err();
        assert!(matches!(err, ApiError::AccessDenied));

        app.state.db.add_member(&board, &app.outsider.user_id).unwrap();
        assert!(resolve_board(&app.state.db, &app.outsider, &board).is_ok());
        assert!(matches!(
            resolve_owned_board(&app.state.db, &app.outsider, &board),
            Err(ApiError::AccessDenied)
        ));
    }
}
