//! Read-side authorization checks shared by listen requests and commands.

use crate::domain::board::{Board, Team};
use crate::domain::foundation::{BoardId, DomainError, ErrorCode, TeamId, UserId};
use crate::ports::DocumentStore;

/// Loads a board the user is allowed to see.
///
/// # Errors
///
/// - `BoardNotFound` if the board does not exist
/// - `Forbidden` if the user is neither the owner nor an allowed member
///   of the team it is shared with
pub async fn visible_board(
    store: &dyn DocumentStore,
    user: &UserId,
    board_id: BoardId,
) -> Result<Board, DomainError> {
    let board = store.board(&board_id).await?.ok_or_else(|| {
        DomainError::new(ErrorCode::BoardNotFound, format!("Board {} not found", board_id))
    })?;

    let team = match board.team_id {
        Some(team_id) => store.team(&team_id).await?,
        None => None,
    };

    if !board.can_view(user, team.as_ref()) {
        return Err(DomainError::new(
            ErrorCode::Forbidden,
            format!("User {} cannot view board {}", user, board_id),
        ));
    }
    Ok(board)
}

/// Loads a team the user belongs to.
pub async fn member_team(
    store: &dyn DocumentStore,
    user: &UserId,
    team_id: TeamId,
) -> Result<Team, DomainError> {
    let team = store.team(&team_id).await?.ok_or_else(|| {
        DomainError::new(ErrorCode::TeamNotFound, format!("Team {} not found", team_id))
    })?;

    if !team.is_member(user) {
        return Err(DomainError::new(
            ErrorCode::Forbidden,
            format!("User {} is not a member of team {}", user, team_id),
        ));
    }
    Ok(team)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::InMemoryDocumentStore;
    use crate::domain::board::Column;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[tokio::test]
    async fn owner_sees_personal_board() {
        let store = InMemoryDocumentStore::new();
        let board = Board::new(user("owner"), "Mine", vec![Column::new("To do")]);
        let id = board.id;
        store.insert_board(board).await;

        assert!(visible_board(&store, &user("owner"), id).await.is_ok());
        let err = visible_board(&store, &user("other"), id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn team_member_sees_shared_board() {
        let store = InMemoryDocumentStore::new();
        let team = Team::new("Kitchen", [user("owner"), user("member")]);
        let board = Board::new(user("owner"), "Shared", vec![Column::new("To do")]).shared_with(team.id);
        let id = board.id;
        store.insert_team(team).await;
        store.insert_board(board).await;

        assert!(visible_board(&store, &user("member"), id).await.is_ok());
        assert!(visible_board(&store, &user("outsider"), id).await.is_err());
    }

    #[tokio::test]
    async fn missing_documents_are_not_found() {
        let store = InMemoryDocumentStore::new();

        let err = visible_board(&store, &user("u"), BoardId::new()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::BoardNotFound);

        let err = member_team(&store, &user("u"), TeamId::new()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::TeamNotFound);
    }

    #[tokio::test]
    async fn non_member_is_forbidden_from_team() {
        let store = InMemoryDocumentStore::new();
        let team = Team::new("Kitchen", [user("a")]);
        let id = team.id;
        store.insert_team(team).await;

        assert!(member_team(&store, &user("a"), id).await.is_ok());
        assert_eq!(
            member_team(&store, &user("b"), id).await.unwrap_err().code(),
            ErrorCode::Forbidden
        );
    }
}
