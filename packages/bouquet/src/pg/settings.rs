//! Turns a request context into transaction-local Postgres settings.
//!
//! The pipeline is `extract_settings` → `split_for_transaction` →
//! `build_settings_statement`. All three are pure; the executor in
//! [`super::txn`] applies the result.

use std::collections::{HashSet, VecDeque};

use serde_json::{Map, Value};

use super::context::{ContextPart, RequestContext, RoleSource};
use super::scalar::{Scalar, SettingsMap};
use super::statement::Statement;

/// Reserved settings key that carries the transaction role.
pub const ROLE_KEY: &str = "role";

/// Builds the settings mapping for one transaction.
///
/// The resolved role comes first, then `defaults`, then every requested part in
/// the order given. `defaults` should not contain names under `request.`.
pub fn extract_settings(
    ctx: &RequestContext,
    parts: &[ContextPart],
    role: &RoleSource,
    defaults: &SettingsMap,
) -> SettingsMap {
    let mut settings = SettingsMap::new();
    settings.insert(ROLE_KEY, role.resolve(ctx));
    settings.extend(defaults);

    for part in parts {
        collect_part(ctx, *part, &mut settings);
    }

    settings
}

fn collect_part(ctx: &RequestContext, part: ContextPart, settings: &mut SettingsMap) {
    let segment = part.setting_segment();
    match part {
        ContextPart::Headers => {
            for (name, value) in &ctx.headers {
                settings.insert(format!("request.{segment}.{name}"), value.as_str());
            }
        }
        ContextPart::User => {
            if let Some(user) = &ctx.user {
                collect_entries(segment, user, settings);
            }
        }
        ContextPart::Query => collect_entries(segment, &ctx.query, settings),
        ContextPart::Params => collect_entries(segment, &ctx.params, settings),
        ContextPart::Body => {
            if let Some(body) = &ctx.body {
                collect_entries(segment, body, settings);
            }
        }
        ContextPart::Session => {
            settings.insert(
                format!("request.{segment}.id"),
                ctx.session_id.clone().unwrap_or_default(),
            );
        }
        ContextPart::FullUrl => settings.insert(format!("request.{segment}"), ctx.full_url()),
        ContextPart::Method => settings.insert(format!("request.{segment}"), ctx.method.as_str()),
    }
}

fn collect_entries(segment: &str, entries: &Map<String, Value>, settings: &mut SettingsMap) {
    for (key, value) in entries {
        settings.insert(format!("request.{segment}.{key}"), Scalar::sanitize(value));
    }
}

/// Role and local settings for one transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionSettings {
    /// `None` means no role statement is issued.
    pub role: Option<String>,
    pub local_settings: Vec<(String, Scalar)>,
}

impl TransactionSettings {
    pub fn role_only(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            local_settings: Vec::new(),
        }
    }
}

/// Separates the reserved `role` entry from the other settings, keeping their order.
/// An empty role counts as none.
pub fn split_for_transaction(settings: SettingsMap) -> TransactionSettings {
    let mut role = None;
    let mut local_settings = Vec::with_capacity(settings.len());

    for (name, value) in settings.into_entries() {
        if name == ROLE_KEY {
            role = Some(value.to_setting_text()).filter(|r| !r.is_empty());
        } else {
            local_settings.push((name, value));
        }
    }

    TransactionSettings {
        role,
        local_settings,
    }
}

/// One `select set_config(...)` statement covering every local setting.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsStatement {
    pub text: String,
    /// Name/value pairs flattened in placeholder order.
    pub values: Vec<Scalar>,
}

impl SettingsStatement {
    /// The statement as sent to the server. `set_config` takes text arguments,
    /// so every value is bound in its text form.
    pub fn to_statement(&self) -> Statement {
        self.values
            .iter()
            .fold(Statement::new(self.text.as_str()), |stmt, value| {
                stmt.bind(value.to_setting_text())
            })
    }
}

/// Compiles the local settings into a single statement, or `None` when there are none.
///
/// When a name repeats, the last occurrence wins and is emitted at its own
/// position: the list is scanned from the end, names already seen are skipped,
/// and survivors are prepended.
pub fn build_settings_statement(local_settings: &[(String, Scalar)]) -> Option<SettingsStatement> {
    if local_settings.is_empty() {
        return None;
    }

    let mut seen = HashSet::new();
    let mut survivors = VecDeque::new();
    for entry in local_settings.iter().rev() {
        if seen.insert(entry.0.as_str()) {
            survivors.push_front(entry);
        }
    }

    let mut fragments = Vec::with_capacity(survivors.len());
    let mut values = Vec::with_capacity(survivors.len() * 2);
    for (i, (name, value)) in survivors.into_iter().enumerate() {
        fragments.push(format!("set_config(${}, ${}, true)", 2 * i + 1, 2 * i + 2));
        values.push(Scalar::Text(name.clone()));
        values.push(value.clone());
    }

    Some(SettingsStatement {
        text: format!("select {}", fragments.join(", ")),
        values,
    })
}
