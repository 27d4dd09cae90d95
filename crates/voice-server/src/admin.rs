//! Loopback-only administrative protocol: line-delimited JSON over TCP,
//! bound to `admin_bind` (default `127.0.0.1:9989`). Backs the `voice-group`
//! CLI binary. Never exposed to players — this is where the operator-only
//! group capabilities (`permanent`, `isolated`) that `GroupRegistry` gates
//! behind `actor: None` actually get exercised.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use uuid::Uuid;
use voice_protocol::group::GroupSettings;
use voice_protocol::ids::{GroupId, PlayerId};

use crate::app_state::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum AdminRequest {
    ListGroups,
    CreateGroup {
        name: String,
        permanent: bool,
        isolated: bool,
        password: Option<String>,
    },
    DeleteGroup {
        group_id: String,
    },
    SetPassword {
        group_id: String,
        password: Option<String>,
    },
    SetPermanent {
        group_id: String,
        permanent: bool,
    },
    SetIsolated {
        group_id: String,
        isolated: bool,
    },
}

#[derive(Debug, Serialize)]
struct AdminGroupView {
    group_id: String,
    name: String,
    member_count: u32,
    max_members: u32,
    permanent: bool,
    isolated: bool,
    has_password: bool,
}

#[derive(Debug, Serialize)]
struct AdminResponse {
    ok: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    groups: Option<Vec<AdminGroupView>>,
}

impl AdminResponse {
    fn ok(message: impl Into<String>) -> Self {
        Self { ok: true, message: message.into(), groups: None }
    }

    fn err(message: impl Into<String>) -> Self {
        Self { ok: false, message: message.into(), groups: None }
    }
}

/// Runs the admin listener until the process exits. Expected to be spawned
/// once from `main.rs`; a bind failure is treated as fatal startup error
/// rather than logged-and-ignored, since an operator with no admin channel
/// has no way to manage permanent/isolated groups at all.
pub async fn run(state: Arc<AppState>, bind_addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!(%bind_addr, "admin listener bound");
    loop {
        let (socket, peer_addr) = match listener.accept().await {
            Ok(result) => result,
            Err(err) => {
                error!(%err, "admin accept error");
                continue;
            }
        };
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(socket, state).await {
                warn!(%peer_addr, %err, "admin connection ended with error");
            }
        });
    }
}

async fn handle_connection(socket: tokio::net::TcpStream, state: Arc<AppState>) -> anyhow::Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<AdminRequest>(&line) {
            Ok(request) => handle_request(&state, request),
            Err(err) => AdminResponse::err(format!("malformed request: {err}")),
        };
        let mut payload = serde_json::to_vec(&response)?;
        payload.push(b'\n');
        write_half.write_all(&payload).await?;
    }
    Ok(())
}

fn handle_request(state: &AppState, request: AdminRequest) -> AdminResponse {
    match request {
        AdminRequest::ListGroups => AdminResponse {
            ok: true,
            message: "ok".into(),
            groups: Some(state.groups.list().into_iter().map(to_view).collect()),
        },
        AdminRequest::CreateGroup { name, permanent, isolated, password } => {
            let operator = PlayerId::new_random();
            let settings = GroupSettings::default();
            match state.groups.create_with_isolation(name, permanent, isolated, operator, settings, password) {
                Ok(group_id) => AdminResponse::ok(format!("created group {group_id}")),
                Err(err) => AdminResponse::err(format!("{err:?}")),
            }
        }
        AdminRequest::DeleteGroup { group_id } => with_group_id(&group_id, |gid| match state.groups.delete(gid) {
            Ok(()) => AdminResponse::ok("deleted"),
            Err(err) => AdminResponse::err(format!("{err:?}")),
        }),
        AdminRequest::SetPassword { group_id, password } => with_group_id(&group_id, |gid| {
            let Some(actor) = state.groups.creator_of(gid) else {
                return AdminResponse::err("group not found");
            };
            match state.groups.set_password(gid, actor, password) {
                Ok(()) => AdminResponse::ok("password updated"),
                Err(err) => AdminResponse::err(format!("{err:?}")),
            }
        }),
        AdminRequest::SetPermanent { group_id, permanent } => with_group_id(&group_id, |gid| match state.groups.set_permanent(gid, None, permanent) {
            Ok(()) => AdminResponse::ok(format!("permanent={permanent}")),
            Err(err) => AdminResponse::err(format!("{err:?}")),
        }),
        AdminRequest::SetIsolated { group_id, isolated } => with_group_id(&group_id, |gid| match state.groups.set_isolated(gid, None, isolated) {
            Ok(()) => AdminResponse::ok(format!("isolated={isolated}")),
            Err(err) => AdminResponse::err(format!("{err:?}")),
        }),
    }
}

fn with_group_id(raw: &str, f: impl FnOnce(GroupId) -> AdminResponse) -> AdminResponse {
    match Uuid::parse_str(raw) {
        Ok(uuid) => f(GroupId::from_bytes(*uuid.as_bytes())),
        Err(_) => AdminResponse::err("invalid group id"),
    }
}

fn to_view(summary: voice_protocol::group::GroupSummary) -> AdminGroupView {
    AdminGroupView {
        group_id: summary.group_id.to_string(),
        name: summary.name,
        member_count: summary.member_count,
        max_members: summary.max_members,
        permanent: summary.permanent,
        isolated: summary.isolated,
        has_password: summary.has_password,
    }
}
