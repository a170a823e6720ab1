//! Policy Wire Format
//!
//! Translates between the in-memory matrix and the JSON document served by
//! the permissions endpoint. Two entry shapes exist on the wire:
//!
//! - flags: `{"module": "vitals", "create": true, "read": true, "update": false, "delete": false}`
//!   (older writers used `view`/`edit` in place of `read`/`update`)
//! - tuple: `{"module": "vitals", "action": "create", "allowed": true}`
//!
//! Both are accepted on read. Writes always use the flags shape with CRUD keys.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::error::LoadError;
use super::policy::{module_key, Action, PermissionMatrix, Role};

/// Body of `GET`/`POST /system-settings/permissions`
pub type WirePayload = BTreeMap<String, Vec<FlagsEntry>>;

/// Flags-shaped entry as written by this crate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagsEntry {
    pub module: String,
    pub create: bool,
    pub read: bool,
    pub update: bool,
    pub delete: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IncomingEntry {
    Tuple(TupleEntry),
    Flags(IncomingFlags),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TupleEntry {
    module: String,
    action: String,
    allowed: bool,
}

/// Flags entry as read. Unknown keys are rejected so a broken tuple
/// entry can never pass as an empty flags entry.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IncomingFlags {
    module: String,
    #[serde(default)]
    create: Option<bool>,
    #[serde(default)]
    read: Option<bool>,
    #[serde(default)]
    view: Option<bool>,
    #[serde(default)]
    update: Option<bool>,
    #[serde(default)]
    edit: Option<bool>,
    #[serde(default)]
    delete: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vocabulary {
    Crud,
    Legacy,
}

/// Map a wire action word to the canonical action
fn wire_action(word: &str) -> Option<(Action, Option<Vocabulary>)> {
    match word.trim().to_ascii_lowercase().as_str() {
        "create" => Some((Action::Create, None)),
        "read" => Some((Action::Read, Some(Vocabulary::Crud))),
        "update" => Some((Action::Update, Some(Vocabulary::Crud))),
        "delete" => Some((Action::Delete, None)),
        "view" => Some((Action::Read, Some(Vocabulary::Legacy))),
        "edit" => Some((Action::Update, Some(Vocabulary::Legacy))),
        _ => None,
    }
}

/// Tracks which vocabulary one role's entries use
struct VocabularyGuard<'a> {
    role_key: &'a str,
    seen: Option<Vocabulary>,
}

impl<'a> VocabularyGuard<'a> {
    fn new(role_key: &'a str) -> Self {
        Self { role_key, seen: None }
    }

    fn observe(&mut self, vocabulary: Option<Vocabulary>) -> Result<(), LoadError> {
        let Some(vocabulary) = vocabulary else {
            return Ok(());
        };
        match self.seen {
            None => {
                self.seen = Some(vocabulary);
                Ok(())
            }
            Some(seen) if seen == vocabulary => Ok(()),
            Some(_) => Err(LoadError::Malformed(format!(
                "role '{}' mixes read/update with view/edit",
                self.role_key
            ))),
        }
    }
}

fn normalize_module(module: &str, role_key: &str) -> Result<String, LoadError> {
    let module = module_key(module).into_owned();
    if module.is_empty() {
        return Err(LoadError::Malformed(format!(
            "role '{}' has an entry without a module",
            role_key
        )));
    }
    Ok(module)
}

/// Parse a response body into a normalized matrix
pub fn decode(body: &str) -> Result<PermissionMatrix, LoadError> {
    if body.trim().is_empty() {
        return Err(LoadError::Empty);
    }
    let value: Value = serde_json::from_str(body)?;
    decode_value(value)
}

/// Parse an already-deserialized document into a normalized matrix
pub fn decode_value(value: Value) -> Result<PermissionMatrix, LoadError> {
    let Value::Object(roles) = value else {
        return Err(LoadError::Malformed(
            "expected an object keyed by role".to_string(),
        ));
    };

    let mut matrix = PermissionMatrix::new();
    let mut entry_count = 0usize;

    for (role_key, entries) in roles {
        let role: Role = match role_key.parse() {
            Ok(role) => role,
            Err(_) => {
                tracing::warn!(role = %role_key, "ignoring unknown role in permissions payload");
                continue;
            }
        };

        let Value::Array(entries) = entries else {
            return Err(LoadError::Malformed(format!(
                "role '{}' must map to an array of entries",
                role_key
            )));
        };

        let mut vocabulary = VocabularyGuard::new(&role_key);
        let policy = matrix.policy_mut(role);

        for raw in entries {
            let entry: IncomingEntry = serde_json::from_value(raw).map_err(|e| {
                LoadError::Malformed(format!("role '{}': {}", role_key, e))
            })?;

            match entry {
                IncomingEntry::Tuple(TupleEntry {
                    module,
                    action,
                    allowed,
                }) => {
                    let module = normalize_module(&module, &role_key)?;
                    let (action, vocab) = wire_action(&action).ok_or_else(|| {
                        LoadError::Malformed(format!(
                            "role '{}' uses unknown action '{}'",
                            role_key, action
                        ))
                    })?;
                    vocabulary.observe(vocab)?;
                    policy.set(&module, action, allowed);
                    entry_count += 1;
                }
                IncomingEntry::Flags(IncomingFlags {
                    module,
                    create,
                    read,
                    view,
                    update,
                    edit,
                    delete,
                }) => {
                    let module = normalize_module(&module, &role_key)?;
                    let flags = [
                        ("create", create),
                        ("read", read),
                        ("view", view),
                        ("update", update),
                        ("edit", edit),
                        ("delete", delete),
                    ];
                    if flags.iter().all(|(_, flag)| flag.is_none()) {
                        return Err(LoadError::Malformed(format!(
                            "role '{}' has an entry for '{}' without any action flags",
                            role_key, module
                        )));
                    }
                    for (word, flag) in flags {
                        let Some(allowed) = flag else { continue };
                        if let Some((action, vocab)) = wire_action(word) {
                            vocabulary.observe(vocab)?;
                            policy.set(&module, action, allowed);
                            entry_count += 1;
                        }
                    }
                }
            }
        }
    }

    if entry_count == 0 {
        return Err(LoadError::Empty);
    }

    Ok(matrix.normalized())
}

/// Build the flags-shaped document for a full write
pub fn encode(matrix: &PermissionMatrix) -> WirePayload {
    let mut payload = WirePayload::new();
    for (role, policy) in matrix.roles() {
        let entries = policy
            .modules()
            .map(|module| FlagsEntry {
                module: module.to_string(),
                create: policy.allows(module, Action::Create),
                read: policy.allows(module, Action::Read),
                update: policy.allows(module, Action::Update),
                delete: policy.allows(module, Action::Delete),
            })
            .collect();
        payload.insert(role.as_str().to_string(), entries);
    }
    payload
}
