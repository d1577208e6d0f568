use async_graphql::{Context, ErrorExtensions, Result};

use infra::models::Player;

use crate::auth::Claims;
use crate::error::AppError;
use crate::gql::types::Role;

pub fn current_claims<'a>(ctx: &'a Context<'_>) -> Result<&'a Claims> {
    ctx.data::<Claims>()
        .map_err(|_| AppError::Unauthorized("Authentication required".into()).extend())
}

/// The authenticated caller as the engine sees a player.
pub fn current_player(ctx: &Context<'_>) -> Result<Player> {
    current_claims(ctx)?.player().map_err(|e| e.extend())
}

/// Check if the authenticated user has the required role
pub fn require_role(ctx: &Context<'_>, required_role: Role) -> Result<Player> {
    let claims = current_claims(ctx)?;
    if !has_required_role(claims.role, required_role) {
        return Err(AppError::Forbidden(format!(
            "Insufficient permissions. Required role: {:?}",
            required_role
        ))
        .extend());
    }
    claims.player().map_err(|e| e.extend())
}

pub fn is_manager(ctx: &Context<'_>) -> bool {
    ctx.data::<Claims>()
        .map(|c| c.role == Role::Manager)
        .unwrap_or(false)
}

fn has_required_role(user_role: Role, required_role: Role) -> bool {
    match required_role {
        Role::Manager => user_role == Role::Manager,
        Role::Player => true, // Everyone has player permissions
    }
}
