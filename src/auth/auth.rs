use axum::{http::StatusCode, Json};

use crate::config::Config;
use crate::models::{Document, ErrorResponse, Role, UserId};

/// Role of the user on the document, or 404 when the document is not
/// visible to them at all
pub fn ensure_visible(doc: &Document, user: &UserId) -> Result<Role, (StatusCode, Json<ErrorResponse>)> {
    match doc.role_of(user) {
        Some(role) => Ok(role),
        None => Err(ErrorResponse::reply(
            StatusCode::NOT_FOUND,
            format!("Document '{}' not found", doc.id),
        )),
    }
}

pub fn ensure_editor(doc: &Document, user: &UserId) -> Result<Role, (StatusCode, Json<ErrorResponse>)> {
    let role = ensure_visible(doc, user)?;
    if role.can_edit() {
        return Ok(role);
    }

    let status = StatusCode::FORBIDDEN;
    Err((status, Json(ErrorResponse {
        code: status.as_u16(),
        status: status.to_string(),
        error: format!("Role '{}' cannot edit document '{}'", role, doc.id),
    })))
}

pub fn ensure_owner(doc: &Document, user: &UserId) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    match ensure_visible(doc, user)? {
        Role::Owner => Ok(()),
        role => Err(ErrorResponse::reply(
            StatusCode::FORBIDDEN,
            format!("Only the owner can change document '{}' (your role: {})", doc.id, role),
        )),
    }
}

/// Operator-only endpoints; admins are listed in `ADMIN_USER_IDS`
pub fn ensure_admin(config: &Config, user: &UserId) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if config.is_admin(user.as_str()) {
        return Ok(());
    }

    let status = StatusCode::FORBIDDEN;
    Err((status, Json(ErrorResponse {
        code: status.as_u16(),
        status: status.to_string(),
        error: "Admin access required".to_string(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Collaborator, DocumentId, ScenePayload};
    use chrono::Utc;

    fn doc() -> Document {
        Document {
            id: DocumentId::from("doc1"),
            owner: UserId::from("alice"),
            scene: ScenePayload::empty(),
            head_seq: 0,
            collaborators: vec![
                Collaborator { user_id: UserId::from("bob"), role: Role::Editor },
                Collaborator { user_id: UserId::from("carol"), role: Role::Viewer },
            ],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn strangers_see_not_found() {
        let err = ensure_visible(&doc(), &UserId::from("mallory")).unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn viewers_cannot_edit_and_editors_cannot_administer() {
        assert_eq!(ensure_editor(&doc(), &UserId::from("carol")).unwrap_err().0, StatusCode::FORBIDDEN);
        assert_eq!(ensure_editor(&doc(), &UserId::from("bob")).unwrap(), Role::Editor);
        assert_eq!(ensure_owner(&doc(), &UserId::from("bob")).unwrap_err().0, StatusCode::FORBIDDEN);
        assert!(ensure_owner(&doc(), &UserId::from("alice")).is_ok());
    }

    #[test]
    fn only_listed_users_are_admins() {
        let config = Config { admin_user_ids: Some("ops".to_string()), ..Config::default() };
        assert!(ensure_admin(&config, &UserId::from("ops")).is_ok());
        let (status, Json(body)) = ensure_admin(&config, &UserId::from("alice")).unwrap_err();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.code, 403);
        assert!(ensure_admin(&Config::default(), &UserId::from("ops")).is_err());
    }
}
