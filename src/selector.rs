//! Recipe selection
//!
//! Every role the application is deployed to that this host also holds
//! contributes one `application::<thing>` recipe per declared thing.

use converge::{ApplicationRecord, Engine, RunContext};
use thiserror::Error;

/// Cookbook that provides the per-thing recipes
pub const COOKBOOK: &str = "application";

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("Application {app} has no type entry for role {role}")]
    MissingType { app: String, role: String },

    /// The engine refused to include a recipe
    #[error(transparent)]
    Engine(anyhow::Error),
}

pub fn recipe_name(thing: &str) -> String {
    format!("{COOKBOOK}::{thing}")
}

/// Roles of `app` held by the host, in the application's declared order
pub fn matched_roles<'a>(app: &'a ApplicationRecord, host_roles: &[String]) -> Vec<&'a str> {
    app.server_roles
        .iter()
        .filter(|role| host_roles.contains(role))
        .map(String::as_str)
        .collect()
}

/// Include the recipes `app` needs on this host
///
/// Each recipe is removed from the seen set right before it is included,
/// so it runs even if something loaded it earlier. `current_app` points at
/// `app` while recipes are included and is cleared on return.
pub fn select_recipes(
    app: &ApplicationRecord,
    host_roles: &[String],
    ctx: &mut RunContext,
    engine: &mut dyn Engine,
) -> Result<Vec<String>, SelectError> {
    let roles = matched_roles(app, host_roles);
    if roles.is_empty() {
        log::info!("None of this server's roles match the app's server_roles.");
        ctx.current_app = None;
        return Ok(Vec::new());
    }

    let result = include_all(app, &roles, ctx, engine);
    ctx.current_app = None;
    result
}

fn include_all(
    app: &ApplicationRecord,
    roles: &[&str],
    ctx: &mut RunContext,
    engine: &mut dyn Engine,
) -> Result<Vec<String>, SelectError> {
    let mut recipes = Vec::new();
    for role in roles {
        let things = app.things_for(role).ok_or_else(|| SelectError::MissingType {
            app: app.id.clone(),
            role: (*role).to_string(),
        })?;

        for thing in things {
            let recipe = recipe_name(thing);
            log::debug!("Including {recipe} for role {role}");
            ctx.current_app = Some(app.clone());
            ctx.seen_recipes.remove(&recipe);
            engine
                .include_recipe(ctx, &recipe)
                .map_err(SelectError::Engine)?;
            recipes.push(recipe);
        }
    }
    Ok(recipes)
}
