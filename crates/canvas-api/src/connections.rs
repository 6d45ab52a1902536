use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use canvas_db::Database;
use canvas_types::api::{Claims, ConnectionResponse, CreateConnectionRequest, OkResponse};

use crate::access::{Principal, resolve_board};
use crate::auth::AppState;
use crate::blocking;
use crate::cards::connection_response;
use crate::error::ApiError;

/// Link two cards on the same board. Self-loops and endpoints that are
/// missing or live on another board are rejected; duplicate edges are not.
pub fn create_connection(
    db: &Database,
    principal: &Principal,
    board_id: &str,
    req: CreateConnectionRequest,
) -> Result<ConnectionResponse, ApiError> {
    let board = resolve_board(db, principal, board_id)?;

    let (Some(from), Some(to)) = (req.from_card_id, req.to_card_id) else {
        return Err(ApiError::validation("Invalid connection"));
    };
    if from.is_empty() || to.is_empty() || from == to {
        return Err(ApiError::validation("Invalid connection"));
    }
    for card_id in [&from, &to] {
        match db.get_card(card_id)? {
            Some(card) if card.board_id == board.id => {}
            _ => return Err(ApiError::validation("Invalid connection")),
        }
    }

    let row = db.create_connection(&board.id, &from, &to)?;
    Ok(connection_response(row))
}

pub fn delete_connection(db: &Database, principal: &Principal, connection_id: &str) -> Result<(), ApiError> {
    let conn = db
        .get_connection(connection_id)?
        .ok_or(ApiError::NotFound("Connection"))?;
    resolve_board(db, principal, &conn.board_id)?;
    db.delete_connection(&conn.id)?;
    Ok(())
}

/// POST /boards/{board_id}/connections
pub async fn post_connection(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConnectionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = Principal::from(&claims);
    let conn = blocking(move || create_connection(&state.db, &principal, &board_id, req)).await?;
    Ok((StatusCode::CREATED, Json(conn)))
}

/// DELETE /connections/{connection_id}
pub async fn remove_connection(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<OkResponse>, ApiError> {
    let principal = Principal::from(&claims);
    blocking(move || delete_connection(&state.db, &principal, &connection_id)).await?;
    Ok(Json(OkResponse::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestApp;

    fn link(from: &str, to: &str) -> CreateConnectionRequest {
        CreateConnectionRequest {
            from_card_id: Some(from.into()),
            to_card_id: Some(to.into()),
        }
    }

    #[test]
    fn self_loops_are_rejected_without_writing() {
        let app = TestApp::new();
        let board = app.board("Flow");
        let a = app.card(&board, "A");

        let err = create_connection(&app.state.db, &app.owner, &board, link(&a, &a)).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(app.state.db.list_connections(&board).unwrap().is_empty());
    }

    #[test]
    fn endpoints_must_exist_on_the_board() {
        let app = TestApp::new();
        let board = app.board("Flow");
        let other = app.board("Other");
        let a = app.card(&board, "A");
        let foreign = app.card(&other, "Foreign");
        let db = &app.state.db;

        assert!(matches!(
            create_connection(db, &app.owner, &board, link(&a, "missing")),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            create_connection(db, &app.owner, &board, link(&a, &foreign)),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            create_connection(db, &app.owner, &board, CreateConnectionRequest::default()),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn duplicate_edges_are_allowed() {
        let app = TestApp::new();
        let board = app.board("Flow");
        let a = app.card(&board, "A");
        let b = app.card(&board, "B");
        let db = &app.state.db;

        let first = create_connection(db, &app.owner, &board, link(&a, &b)).unwrap();
        create_connection(db, &app.owner, &board, link(&a, &b)).unwrap();
        assert_eq!(db.list_connections(&board).unwrap().len(), 2);

        assert!(matches!(
            delete_connection(db, &app.outsider, &first.id),
            Err(ApiError::AccessDenied)
        ));
        delete_connection(db, &app.owner, &first.id).unwrap();
        assert_eq!(db.list_connections(&board).unwrap().len(), 1);
    }

    #[test]
    fn linking_and_unlinking_touch_the_board() {
        let app = TestApp::new();
        let board = app.board("Flow");
        let a = app.card(&board, "A");
        let b = app.card(&board, "B");
        let db = &app.state.db;

        app.age_board(&board);
        let conn = create_connection(db, &app.owner, &board, link(&a, &b)).unwrap();
        assert!(app.board_was_touched(&board));

        app.age_board(&board);
        delete_connection(db, &app.owner, &conn.id).unwrap();
        assert!(app.board_was_touched(&board));
    }
}
