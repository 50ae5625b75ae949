//! The operation registry.
//!
//! One entry per operation type: the authorization class, the wrapper
//! to invoke, and a builder that validates the payload and produces
//! the argument vector plus the optional stdin secret. The engine and
//! the kernel both drive operations exclusively through this table.

use opsgate_authz::OperationClass;
use opsgate_core::OperationType;
use opsgate_validate::{
    ValidationError, validate_bcrypt_hash, validate_cron_schedule, validate_forbidden_char_free,
    validate_groupname, validate_home_dir, validate_no_user_group_collision,
    validate_not_forbidden_group, validate_not_forbidden_user, validate_shell, validate_username,
};
use serde_json::Value;
use std::collections::HashMap;
use zeroize::Zeroizing;

/// Configuration consulted by payload builders.
#[derive(Debug, Clone, Default)]
pub struct RegistryContext {
    /// Absolute command paths a cron entry may invoke.
    pub allowed_cron_commands: Vec<String>,
}

/// A ready-to-run wrapper invocation derived from a validated payload.
pub struct Invocation {
    /// The wrapper to invoke.
    pub wrapper_id: &'static str,
    /// The argument vector. Never carries secrets.
    pub argv: Vec<String>,
    /// Secret bytes for the child's stdin, zeroized on drop.
    pub stdin: Option<Zeroizing<Vec<u8>>>,
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("wrapper_id", &self.wrapper_id)
            .field("argv", &self.argv)
            .field("stdin", &self.stdin.as_ref().map(|_| "<secret>"))
            .finish()
    }
}

type BuildFn = fn(&Value, &RegistryContext) -> Result<Invocation, ValidationError>;

/// One registry entry.
pub struct OperationSpec {
    /// The operation type.
    pub operation: OperationType,
    /// How the authorizer classifies this operation.
    pub class: OperationClass,
    /// The wrapper the operation executes through.
    pub wrapper_id: &'static str,
    build: BuildFn,
}

impl OperationSpec {
    /// Validate a payload and derive the invocation.
    ///
    /// # Errors
    ///
    /// Returns the first violated payload rule.
    pub fn build(
        &self,
        payload: &Value,
        ctx: &RegistryContext,
    ) -> Result<Invocation, ValidationError> {
        (self.build)(payload, ctx)
    }
}

impl std::fmt::Debug for OperationSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationSpec")
            .field("operation", &self.operation)
            .field("class", &self.class)
            .field("wrapper_id", &self.wrapper_id)
            .finish_non_exhaustive()
    }
}

/// The operation type -> spec table.
#[derive(Debug)]
pub struct OperationRegistry {
    specs: HashMap<OperationType, OperationSpec>,
    ctx: RegistryContext,
}

impl OperationRegistry {
    /// The built-in operation table.
    #[must_use]
    pub fn builtin(ctx: RegistryContext) -> Self {
        let entries: Vec<(&str, OperationClass, &'static str, BuildFn)> = vec![
            // Write operations.
            ("user_add", OperationClass::Write { object: "users" }, "user_add", build_user_add),
            ("user_delete", OperationClass::Write { object: "users" }, "user_delete", build_user_delete),
            ("user_modify", OperationClass::Write { object: "users" }, "user_modify", build_user_modify),
            ("user_passwd", OperationClass::Write { object: "users" }, "user_passwd", build_user_passwd),
            ("group_add", OperationClass::Write { object: "groups" }, "group_add", build_group_add),
            ("group_delete", OperationClass::Write { object: "groups" }, "group_delete", build_group_delete),
            ("group_modify", OperationClass::Write { object: "groups" }, "group_modify", build_group_modify),
            ("cron_add", OperationClass::Write { object: "cron" }, "cron_add", build_cron_add),
            ("cron_delete", OperationClass::Write { object: "cron" }, "cron_delete", build_cron_delete),
            ("cron_modify", OperationClass::Write { object: "cron" }, "cron_modify", build_cron_modify),
            ("service_stop", OperationClass::Write { object: "services" }, "service_stop", build_service_stop),
            ("firewall_modify", OperationClass::Write { object: "firewall" }, "firewall_modify", build_firewall_modify),
            // Read operations; direct-execute only.
            ("process_list", OperationClass::Read { object: "processes" }, "process_list", build_process_list),
            ("user_list", OperationClass::Read { object: "users" }, "user_list", build_user_list),
            ("cron_list", OperationClass::Read { object: "cron" }, "cron_list", build_cron_list),
            ("service_status", OperationClass::Read { object: "services" }, "service_status", build_service_status),
        ];

        let mut specs = HashMap::with_capacity(entries.len());
        for (name, class, wrapper_id, build) in entries {
            if let Ok(operation) = OperationType::parse(name) {
                specs.insert(
                    operation.clone(),
                    OperationSpec {
                        operation,
                        class,
                        wrapper_id,
                        build,
                    },
                );
            }
        }
        Self { specs, ctx }
    }

    /// Look up an operation.
    #[must_use]
    pub fn get(&self, operation: &OperationType) -> Option<&OperationSpec> {
        self.specs.get(operation)
    }

    /// Registered operation types, unordered.
    pub fn operations(&self) -> impl Iterator<Item = &OperationType> {
        self.specs.keys()
    }

    /// Validate a payload and derive the invocation for an operation.
    ///
    /// # Errors
    ///
    /// Returns the first violated payload rule; the caller maps an
    /// unknown operation before reaching here.
    pub fn build(
        &self,
        spec: &OperationSpec,
        payload: &Value,
    ) -> Result<Invocation, ValidationError> {
        spec.build(payload, &self.ctx)
    }
}

// -- Payload field helpers --

fn str_field<'a>(payload: &'a Value, field: &str) -> Result<&'a str, ValidationError> {
    match payload.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ValidationError::InvalidField {
            field: field.to_string(),
            reason: "must be a string".to_string(),
        }),
        None => Err(ValidationError::MissingField(field.to_string())),
    }
}

fn opt_str_field<'a>(payload: &'a Value, field: &str) -> Result<Option<&'a str>, ValidationError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ValidationError::InvalidField {
            field: field.to_string(),
            reason: "must be a string".to_string(),
        }),
    }
}

fn opt_str_array<'a>(
    payload: &'a Value,
    field: &str,
) -> Result<Option<Vec<&'a str>>, ValidationError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().ok_or_else(|| ValidationError::InvalidField {
                    field: field.to_string(),
                    reason: "must be an array of strings".to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(ValidationError::InvalidField {
            field: field.to_string(),
            reason: "must be an array of strings".to_string(),
        }),
    }
}

fn opt_bool_field(payload: &Value, field: &str) -> Result<bool, ValidationError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(ValidationError::InvalidField {
            field: field.to_string(),
            reason: "must be a boolean".to_string(),
        }),
    }
}

fn validated_username<'a>(payload: &'a Value, field: &str) -> Result<&'a str, ValidationError> {
    let username = str_field(payload, field)?;
    validate_username(username)?;
    validate_not_forbidden_user(username)?;
    Ok(username)
}

fn secret_hash(payload: &Value, field: &str) -> Result<Zeroizing<Vec<u8>>, ValidationError> {
    let hash = str_field(payload, field)?;
    validate_bcrypt_hash(hash)?;
    Ok(Zeroizing::new(hash.as_bytes().to_vec()))
}

// -- Builders --

fn build_user_add(payload: &Value, _ctx: &RegistryContext) -> Result<Invocation, ValidationError> {
    let username = validated_username(payload, "username")?;
    let mut argv = vec![format!("--username={username}")];

    if let Some(groups) = opt_str_array(payload, "groups")? {
        for group in &groups {
            validate_groupname(group)?;
            validate_not_forbidden_group(group)?;
        }
        argv.push(format!("--groups={}", groups.join(",")));
    }

    let shell = str_field(payload, "shell")?;
    validate_shell(shell)?;
    argv.push(format!("--shell={shell}"));

    if let Some(home) = opt_str_field(payload, "home")? {
        validate_home_dir(home)?;
        argv.push(format!("--home={home}"));
    }

    let stdin = match payload.get("password_hash") {
        None | Some(Value::Null) => None,
        Some(_) => Some(secret_hash(payload, "password_hash")?),
    };

    Ok(Invocation {
        wrapper_id: "user_add",
        argv,
        stdin,
    })
}

fn build_user_delete(
    payload: &Value,
    _ctx: &RegistryContext,
) -> Result<Invocation, ValidationError> {
    let username = validated_username(payload, "username")?;
    let mut argv = vec![format!("--username={username}")];
    if opt_bool_field(payload, "remove_home")? {
        argv.push("--remove-home".to_string());
    }
    Ok(Invocation {
        wrapper_id: "user_delete",
        argv,
        stdin: None,
    })
}

fn build_user_modify(
    payload: &Value,
    _ctx: &RegistryContext,
) -> Result<Invocation, ValidationError> {
    let username = validated_username(payload, "username")?;
    let mut argv = vec![format!("--username={username}")];

    if let Some(shell) = opt_str_field(payload, "shell")? {
        validate_shell(shell)?;
        argv.push(format!("--shell={shell}"));
    }
    if let Some(home) = opt_str_field(payload, "home")? {
        validate_home_dir(home)?;
        argv.push(format!("--home={home}"));
    }
    if let Some(groups) = opt_str_array(payload, "groups")? {
        for group in &groups {
            validate_groupname(group)?;
            validate_not_forbidden_group(group)?;
        }
        argv.push(format!("--groups={}", groups.join(",")));
    }

    if argv.len() == 1 {
        return Err(ValidationError::InvalidField {
            field: "payload".to_string(),
            reason: "no changes requested".to_string(),
        });
    }
    Ok(Invocation {
        wrapper_id: "user_modify",
        argv,
        stdin: None,
    })
}

fn build_user_passwd(
    payload: &Value,
    _ctx: &RegistryContext,
) -> Result<Invocation, ValidationError> {
    let username = validated_username(payload, "username")?;
    let stdin = secret_hash(payload, "password_hash")?;
    Ok(Invocation {
        wrapper_id: "user_passwd",
        argv: vec![format!("--username={username}")],
        stdin: Some(stdin),
    })
}

fn validated_groupname<'a>(payload: &'a Value, new_group: bool) -> Result<&'a str, ValidationError> {
    let groupname = str_field(payload, "groupname")?;
    validate_groupname(groupname)?;
    validate_not_forbidden_group(groupname)?;
    if new_group {
        validate_no_user_group_collision(groupname)?;
    }
    Ok(groupname)
}

fn build_group_add(payload: &Value, _ctx: &RegistryContext) -> Result<Invocation, ValidationError> {
    let groupname = validated_groupname(payload, true)?;
    Ok(Invocation {
        wrapper_id: "group_add",
        argv: vec![format!("--groupname={groupname}")],
        stdin: None,
    })
}

fn build_group_delete(
    payload: &Value,
    _ctx: &RegistryContext,
) -> Result<Invocation, ValidationError> {
    let groupname = validated_groupname(payload, false)?;
    Ok(Invocation {
        wrapper_id: "group_delete",
        argv: vec![format!("--groupname={groupname}")],
        stdin: None,
    })
}

fn build_group_modify(
    payload: &Value,
    _ctx: &RegistryContext,
) -> Result<Invocation, ValidationError> {
    let groupname = validated_groupname(payload, false)?;
    let mut argv = vec![format!("--groupname={groupname}")];

    let add = opt_str_array(payload, "add_members")?.unwrap_or_default();
    let remove = opt_str_array(payload, "remove_members")?.unwrap_or_default();
    for member in add.iter().chain(remove.iter()) {
        validate_username(member)?;
        validate_not_forbidden_user(member)?;
    }
    if add.is_empty() && remove.is_empty() {
        return Err(ValidationError::InvalidField {
            field: "payload".to_string(),
            reason: "no membership changes requested".to_string(),
        });
    }
    if !add.is_empty() {
        argv.push(format!("--add={}", add.join(",")));
    }
    if !remove.is_empty() {
        argv.push(format!("--remove={}", remove.join(",")));
    }
    Ok(Invocation {
        wrapper_id: "group_modify",
        argv,
        stdin: None,
    })
}

/// Split a validated schedule into the five per-field arguments the
/// cron wrappers take (field values stay inside the restricted cron
/// alphabet; the whole expression would carry spaces).
fn schedule_args(schedule: &str) -> Vec<String> {
    let names = ["minute", "hour", "day", "month", "weekday"];
    schedule
        .split_whitespace()
        .zip(names)
        .map(|(field, name)| format!("--{name}={field}"))
        .collect()
}

fn cron_command<'a>(
    payload: &'a Value,
    ctx: &RegistryContext,
) -> Result<&'a str, ValidationError> {
    let command = str_field(payload, "command")?;
    validate_forbidden_char_free("command", command)?;
    if !command.starts_with('/') {
        return Err(ValidationError::InvalidField {
            field: "command".to_string(),
            reason: "must be an absolute path".to_string(),
        });
    }
    if !ctx.allowed_cron_commands.iter().any(|c| c == command) {
        return Err(ValidationError::InvalidField {
            field: "command".to_string(),
            reason: "not in the allowed command list".to_string(),
        });
    }
    Ok(command)
}

fn cron_job_id<'a>(payload: &'a Value) -> Result<&'a str, ValidationError> {
    let job_id = str_field(payload, "job_id")?;
    let valid = !job_id.is_empty()
        && job_id.len() <= 64
        && job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(job_id)
    } else {
        Err(ValidationError::InvalidField {
            field: "job_id".to_string(),
            reason: "must be 1-64 characters of [A-Za-z0-9_-]".to_string(),
        })
    }
}

fn build_cron_add(payload: &Value, ctx: &RegistryContext) -> Result<Invocation, ValidationError> {
    let user = validated_username(payload, "user")?;
    let schedule = str_field(payload, "schedule")?;
    validate_cron_schedule(schedule)?;
    let command = cron_command(payload, ctx)?;

    let mut argv = vec![format!("--user={user}")];
    argv.extend(schedule_args(schedule));
    argv.push(format!("--command={command}"));
    Ok(Invocation {
        wrapper_id: "cron_add",
        argv,
        stdin: None,
    })
}

fn build_cron_delete(
    payload: &Value,
    _ctx: &RegistryContext,
) -> Result<Invocation, ValidationError> {
    let user = validated_username(payload, "user")?;
    let job_id = cron_job_id(payload)?;
    Ok(Invocation {
        wrapper_id: "cron_delete",
        argv: vec![format!("--user={user}"), format!("--job-id={job_id}")],
        stdin: None,
    })
}

fn build_cron_modify(
    payload: &Value,
    ctx: &RegistryContext,
) -> Result<Invocation, ValidationError> {
    let user = validated_username(payload, "user")?;
    let job_id = cron_job_id(payload)?;
    let schedule = str_field(payload, "schedule")?;
    validate_cron_schedule(schedule)?;
    let command = cron_command(payload, ctx)?;

    let mut argv = vec![format!("--user={user}"), format!("--job-id={job_id}")];
    argv.extend(schedule_args(schedule));
    argv.push(format!("--command={command}"));
    Ok(Invocation {
        wrapper_id: "cron_modify",
        argv,
        stdin: None,
    })
}

fn service_name<'a>(payload: &'a Value) -> Result<&'a str, ValidationError> {
    let service = str_field(payload, "service")?;
    let valid = !service.is_empty()
        && service.len() <= 128
        && service
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.' | '@'));
    if valid {
        Ok(service)
    } else {
        Err(ValidationError::InvalidField {
            field: "service".to_string(),
            reason: "must be a lowercase unit name".to_string(),
        })
    }
}

fn build_service_stop(
    payload: &Value,
    _ctx: &RegistryContext,
) -> Result<Invocation, ValidationError> {
    let service = service_name(payload)?;
    Ok(Invocation {
        wrapper_id: "service_stop",
        argv: vec![format!("--service={service}")],
        stdin: None,
    })
}

fn build_firewall_modify(
    payload: &Value,
    _ctx: &RegistryContext,
) -> Result<Invocation, ValidationError> {
    let action = str_field(payload, "action")?;
    if !matches!(action, "allow" | "deny" | "delete") {
        return Err(ValidationError::InvalidField {
            field: "action".to_string(),
            reason: "must be allow, deny, or delete".to_string(),
        });
    }

    let port = payload
        .get("port")
        .and_then(Value::as_u64)
        .ok_or_else(|| ValidationError::MissingField("port".to_string()))?;
    if !(1..=65_535).contains(&port) {
        return Err(ValidationError::InvalidField {
            field: "port".to_string(),
            reason: "must be 1-65535".to_string(),
        });
    }

    let protocol = str_field(payload, "protocol")?;
    if !matches!(protocol, "tcp" | "udp") {
        return Err(ValidationError::InvalidField {
            field: "protocol".to_string(),
            reason: "must be tcp or udp".to_string(),
        });
    }

    let mut argv = vec![
        format!("--action={action}"),
        format!("--port={port}"),
        format!("--protocol={protocol}"),
    ];
    if let Some(source) = opt_str_field(payload, "source")? {
        validate_cidr(source)?;
        argv.push(format!("--source={source}"));
    }
    Ok(Invocation {
        wrapper_id: "firewall_modify",
        argv,
        stdin: None,
    })
}

fn validate_cidr(source: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::InvalidField {
        field: "source".to_string(),
        reason: "must be an IPv4 address or CIDR block".to_string(),
    };
    let (addr, prefix) = match source.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (source, None),
    };
    addr.parse::<std::net::Ipv4Addr>().map_err(|_| invalid())?;
    if let Some(prefix) = prefix {
        let bits: u8 = prefix.parse().map_err(|_| invalid())?;
        if bits > 32 {
            return Err(invalid());
        }
    }
    Ok(())
}

fn build_process_list(
    _payload: &Value,
    _ctx: &RegistryContext,
) -> Result<Invocation, ValidationError> {
    Ok(Invocation {
        wrapper_id: "process_list",
        argv: Vec::new(),
        stdin: None,
    })
}

fn build_user_list(
    _payload: &Value,
    _ctx: &RegistryContext,
) -> Result<Invocation, ValidationError> {
    Ok(Invocation {
        wrapper_id: "user_list",
        argv: Vec::new(),
        stdin: None,
    })
}

fn build_cron_list(payload: &Value, _ctx: &RegistryContext) -> Result<Invocation, ValidationError> {
    let mut argv = Vec::new();
    if let Some(user) = opt_str_field(payload, "user")? {
        validate_username(user)?;
        argv.push(format!("--user={user}"));
    }
    Ok(Invocation {
        wrapper_id: "cron_list",
        argv,
        stdin: None,
    })
}

fn build_service_status(
    payload: &Value,
    _ctx: &RegistryContext,
) -> Result<Invocation, ValidationError> {
    let service = service_name(payload)?;
    Ok(Invocation {
        wrapper_id: "service_status",
        argv: vec![format!("--service={service}")],
        stdin: None,
    })
}
