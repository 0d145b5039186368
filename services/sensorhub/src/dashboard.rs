//! Dashboard pages and JSON API
//!
//! Every page below the dashboard root belongs to one tool route. The
//! caller's role is resolved on each request and the route decision is
//! applied before anything is rendered: denied pages redirect to the root,
//! denied API calls answer 403.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::access::{resolve_level, AccessLevel, Decision, RoleResolver, Route, RouteTable, ToolKind};
use crate::api::ApiClient;
use crate::cards::{device_entry_count, range_status, RangeStatus};
use crate::devices::{NewDevice, NewStream};
use crate::nav::{breadcrumbs, child_href};
use crate::notice::{Notice, NoticeKind};
use crate::poller::current_epoch_ms;
use crate::series::{parse_payload, SeriesBinder};
use crate::session::Session;
use crate::state::StateHandle;
use crate::table::{cell_text, columns_for};
use crate::users::{filter_users, NewAccount, User};
use crate::SensorhubError;

/// Dashboard application state
#[derive(Clone)]
pub struct DashboardState {
    pub state: StateHandle,
    pub routes: Arc<RouteTable>,
    pub resolver: Arc<dyn RoleResolver>,
    pub api: ApiClient,
}

/// Build the dashboard axum router
pub fn build_router(dashboard: DashboardState) -> Router {
    let root = dashboard.routes.root().to_string();

    Router::new()
        .route("/", get(root_handler))
        .route(&root, get(index_handler))
        .route(&format!("{}/{{*rest}}", root), get(tool_handler))
        .route("/api/tools", get(tools_handler))
        .route("/api/sensors", get(sensors_handler))
        .route("/api/sensors/{id}/fields", get(fields_handler))
        .route("/api/sensors/{id}/series", get(series_handler))
        .route(
            "/api/devices",
            get(devices_handler).post(create_device_handler),
        )
        .route("/api/devices/streams", post(create_stream_handler))
        .route("/api/upload", post(upload_handler))
        .route("/api/users", get(users_handler))
        .route("/api/users/{id}/role", put(update_role_handler))
        .route(
            "/api/users/{id}/account",
            post(approve_account_handler).delete(revoke_account_handler),
        )
        .route("/api/profile/account-request", post(request_account_handler))
        .route("/api/notices", get(notices_handler))
        .route("/health", get(health_handler))
        .with_state(dashboard)
}

struct Caller {
    session: Option<Session>,
    level: Option<AccessLevel>,
}

impl DashboardState {
    async fn caller(&self, headers: &HeaderMap) -> Caller {
        let session = session_from(headers);
        let level = resolve_level(session.as_ref(), self.resolver.as_ref()).await;
        Caller { session, level }
    }

    /// Admit an API call under the access set of the `kind` tool
    async fn admit(&self, headers: &HeaderMap, kind: ToolKind) -> Result<Session, Response> {
        let Some(route) = self.routes.route_for(kind) else {
            return Err(json_error(StatusCode::NOT_FOUND, "tool is not configured"));
        };
        let caller = self.caller(headers).await;
        match (route.decide(caller.level), caller.session) {
            (Decision::Allow, Some(session)) => Ok(session),
            _ => Err(json_error(
                StatusCode::FORBIDDEN,
                &format!("access to {} denied", route.tool.name),
            )),
        }
    }

    /// The backend, authenticated as the caller
    fn api_for(&self, session: &Session) -> ApiClient {
        self.api.with_tokens(Arc::new(session.clone()))
    }

    fn visible_routes(&self, level: Option<AccessLevel>) -> Vec<&Route> {
        let Some(level) = level else {
            return Vec::new();
        };
        self.routes
            .routes()
            .iter()
            .filter(|route| route.tool.permits(level))
            .collect()
    }

    /// Post the outcome of a mutation to the caller's notices and answer with it
    async fn finish<T>(
        &self,
        session: &Session,
        result: crate::Result<T>,
        success: &str,
        failure: &str,
    ) -> Response {
        let now_ms = current_epoch_ms();
        match result {
            Ok(_) => {
                tracing::info!("{}", success);
                self.state
                    .write()
                    .await
                    .notices
                    .post_success(&session.user_id, success, now_ms);
                Json(json!({"ok": true, "message": success})).into_response()
            }
            Err(e) => {
                let message = format!("{}: {}", failure, e);
                tracing::warn!("{}", message);
                self.state
                    .write()
                    .await
                    .notices
                    .post_error(&session.user_id, message.clone(), now_ms);
                (
                    mutation_status(&e),
                    Json(json!({"ok": false, "message": message})),
                )
                    .into_response()
            }
        }
    }

    async fn find_user(&self, user_id: &str) -> Option<User> {
        self.state
            .read()
            .await
            .users
            .items
            .iter()
            .find(|user| user.user_id == user_id)
            .cloned()
    }
}

fn session_from(headers: &HeaderMap) -> Option<Session> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    match Session::from_authorization_header(value) {
        Ok(session) => Some(session),
        Err(e) => {
            tracing::debug!("Ignoring unusable Authorization header: {}", e);
            None
        }
    }
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": message}))).into_response()
}

fn mutation_status(e: &SensorhubError) -> StatusCode {
    match e {
        SensorhubError::Api { status, .. } if (400..500).contains(status) => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        SensorhubError::Auth(_) => StatusCode::UNAUTHORIZED,
        SensorhubError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_GATEWAY,
    }
}

// Pages

#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    q: Option<String>,
    field: Option<String>,
    field2: Option<String>,
}

async fn root_handler(State(dashboard): State<DashboardState>) -> Redirect {
    Redirect::to(dashboard.routes.root())
}

async fn index_handler(
    State(dashboard): State<DashboardState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let caller = dashboard.caller(&headers).await;
    let tools = dashboard.visible_routes(caller.level);

    let body = if tools.is_empty() {
        "<p>Sign in with an approved account to see your tools.</p>".to_string()
    } else {
        let items: String = tools
            .iter()
            .map(|route| {
                format!(
                    r#"<li style="padding: 0.25rem 0;"><a href="{}">{}</a></li>"#,
                    escape(route.href()),
                    escape(route.tool.name)
                )
            })
            .collect();
        format!("<ul>{}</ul>", items)
    };

    render_page(
        &dashboard,
        "Dashboard",
        dashboard.routes.root(),
        caller.session.as_ref(),
        caller.level,
        &body,
    )
    .await
}

async fn tool_handler(
    State(dashboard): State<DashboardState>,
    headers: HeaderMap,
    Path(rest): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    // The capture is percent-decoded, so ids compare as stored
    let path = format!("{}/{}", dashboard.routes.root(), rest);
    let Some(route) = dashboard.routes.match_path(&path) else {
        tracing::debug!("No dashboard route for {}", path);
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    };

    let caller = dashboard.caller(&headers).await;
    let session = match (route.decide(caller.level), caller.session) {
        (Decision::Allow, Some(session)) => session,
        (Decision::Redirect(target), _) => return Redirect::to(&target).into_response(),
        (Decision::Allow, None) => return Redirect::to(dashboard.routes.root()).into_response(),
    };

    let body = match route.tool.kind {
        ToolKind::Profile => profile_body(&dashboard, &session, caller.level).await,
        ToolKind::Sensors => sensors_body(&dashboard, route, &path, &query).await,
        ToolKind::Devices => devices_body(&dashboard).await,
        ToolKind::Permissions => permissions_body(&dashboard, query.q.as_deref()).await,
    };

    render_page(
        &dashboard,
        route.tool.name,
        &path,
        Some(&session),
        caller.level,
        &body,
    )
        .await
        .into_response()
}

async fn render_page(
    dashboard: &DashboardState,
    title: &str,
    path: &str,
    session: Option<&Session>,
    level: Option<AccessLevel>,
    body: &str,
) -> Html<String> {
    let nav: String = dashboard
        .visible_routes(level)
        .iter()
        .map(|route| {
            format!(
                r#"<a href="{}" style="margin-right: 1rem;">{}</a>"#,
                escape(route.href()),
                escape(route.tool.name)
            )
        })
        .collect();

    let crumbs: String = breadcrumbs(path)
        .iter()
        .map(|crumb| {
            if crumb.is_last {
                format!("<span>{}</span>", escape(&crumb.label))
            } else {
                format!(
                    r#"<a href="{}">{}</a> / "#,
                    escape(&crumb.href),
                    escape(&crumb.label)
                )
            }
        })
        .collect();

    let notices: String = match session {
        Some(session) => dashboard
            .state
            .read()
            .await
            .notices
            .active(&session.user_id, current_epoch_ms())
            .into_iter()
            .map(notice_banner)
            .collect(),
        None => String::new(),
    };

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title} - Sensorhub</title>
</head>
<body style="font-family: system-ui, sans-serif; max-width: 960px; margin: 0 auto; padding: 1rem;">
    <nav style="padding-bottom: 0.5rem; border-bottom: 1px solid #dee2e6;">{nav}</nav>
    <div style="padding: 0.5rem 0; color: #6c757d;">{crumbs}</div>
    {notices}
    <h1>{title}</h1>
    {body}
</body>
</html>"#,
        title = escape(title),
        nav = nav,
        crumbs = crumbs,
        notices = notices,
        body = body,
    ))
}

fn notice_banner(notice: &Notice) -> String {
    let (color, bg) = match notice.kind {
        NoticeKind::Success => ("#155724", "#d4edda"),
        NoticeKind::Error => ("#721c24", "#f8d7da"),
    };
    format!(
        r#"<div style="padding: 0.5rem; margin: 0.5rem 0; border-radius: 0.25rem; color: {}; background-color: {};">{}</div>"#,
        color,
        bg,
        escape(&notice.message)
    )
}

async fn profile_body(
    dashboard: &DashboardState,
    session: &Session,
    level: Option<AccessLevel>,
) -> String {
    let role = level.map(|l| l.as_str()).unwrap_or("");
    match dashboard.api_for(session).get_user(&session.user_id).await {
        Ok(Some(user)) => format!(
            r#"<table style="border-collapse: collapse;">
                {}{}{}{}
            </table>"#,
            detail_row("Username", &session.user_id),
            detail_row("Email", &user.email),
            detail_row("Role", role),
            detail_row("Cloud account", &user.aws_account_status),
        ),
        Ok(None) => format!(
            "<p>No profile found for {}.</p>",
            escape(&session.user_id)
        ),
        Err(e) => {
            tracing::warn!("Failed to load profile of '{}': {}", session.user_id, e);
            format!("<p>Could not load your profile: {}</p>", escape(&e.to_string()))
        }
    }
}

fn detail_row(label: &str, value: &str) -> String {
    format!(
        r#"<tr><th style="padding: 0.5rem; text-align: left;">{}</th><td style="padding: 0.5rem;">{}</td></tr>"#,
        escape(label),
        escape(value)
    )
}

async fn sensors_body(
    dashboard: &DashboardState,
    route: &Route,
    path: &str,
    query: &PageQuery,
) -> String {
    let sensor_id = Some(path.strip_prefix(route.href()).unwrap_or("").trim_matches('/'))
        .filter(|id| !id.is_empty());

    let records = dashboard.state.read().await.sensors.items.clone();
    match sensor_id {
        None => sensor_cards(dashboard, &records),
        Some(id) => sensor_detail(route, records, id, query),
    }
}

fn sensor_cards(dashboard: &DashboardState, records: &[crate::sensors::SensorRecord]) -> String {
    if records.is_empty() {
        return "<p>No sensors yet.</p>".to_string();
    }
    let ranges = &dashboard.api.config().sensor_ranges;
    let base = dashboard
        .routes
        .route_for(ToolKind::Sensors)
        .map(|route| route.href())
        .unwrap_or("");

    records
        .iter()
        .map(|sensor| {
            let readings = match parse_payload(&sensor.data) {
                Ok(readings) => readings,
                Err(e) => {
                    tracing::warn!("Failed to parse sensor data for '{}': {}", sensor.sensor_id, e);
                    Vec::new()
                }
            };
            let checks: String = ranges
                .iter()
                .filter(|range| range.sensor_id == sensor.sensor_id)
                .map(|range| {
                    let status = range_status(&readings, &range.field, (range.min, range.max));
                    let (text, color) = match status {
                        RangeStatus::InRange => ("in range", "#155724"),
                        RangeStatus::OutOfRange => ("out of range", "#721c24"),
                        RangeStatus::NoData => ("no data", "#383d41"),
                    };
                    format!(
                        r#"<div style="color: {};">{} {}-{}: {}</div>"#,
                        color,
                        escape(&range.field),
                        range.min,
                        range.max,
                        text
                    )
                })
                .collect();
            format!(
                r#"<div style="border: 1px solid #dee2e6; border-radius: 0.25rem; padding: 0.75rem; margin: 0.5rem 0;">
                    <a href="{}"><strong>{}</strong></a>
                    <div>{} entries</div>
                    {}
                </div>"#,
                escape(&child_href(base, &sensor.sensor_id)),
                escape(sensor.label()),
                readings.len(),
                checks
            )
        })
        .collect()
}

fn sensor_detail(
    route: &Route,
    records: Vec<crate::sensors::SensorRecord>,
    sensor_id: &str,
    query: &PageQuery,
) -> String {
    let mut binder = SeriesBinder::new(records);
    binder.select_record(Some(sensor_id));
    if binder.selection().record.is_none() {
        return format!("<p>Unknown sensor {}.</p>", escape(sensor_id));
    }
    binder.select_primary(query.field.as_deref());
    binder.select_secondary(query.field2.as_deref());

    if let Some(e) = binder.parse_error() {
        return format!("<p>This sensor's data could not be read: {}</p>", escape(&e.to_string()));
    }

    let selection = binder.selection();
    let picker = |name: &str, selected: Option<&str>| -> String {
        let options: String = binder
            .candidates()
            .iter()
            .map(|field| {
                let mark = if Some(field.as_str()) == selected { " selected" } else { "" };
                format!(r#"<option value="{0}"{1}>{0}</option>"#, escape(field), mark)
            })
            .collect();
        format!(
            r#"<select name="{}"><option value=""></option>{}</select>"#,
            name, options
        )
    };
    let second = if binder.secondary_available() {
        picker("field2", selection.secondary.as_deref())
    } else {
        String::new()
    };
    let form = format!(
        r#"<form method="get" action="{}">{} {} <button type="submit">Plot</button></form>"#,
        escape(&child_href(route.href(), sensor_id)),
        picker("field", selection.primary.as_deref()),
        second
    );

    let plot = match binder.plot() {
        Some(plot) => {
            let header: String = plot
                .series
                .iter()
                .map(|s| format!("<th>{}</th>", escape(&s.label)))
                .collect();
            let rows: String = plot
                .x
                .iter()
                .enumerate()
                .map(|(i, x)| {
                    let cells: String = plot
                        .series
                        .iter()
                        .map(|s| format!("<td>{}</td>", point(s.y.get(i).copied())))
                        .collect();
                    format!("<tr><td>{}</td>{}</tr>", point(Some(*x)), cells)
                })
                .collect();
            format!(
                r#"<h2>Plot</h2><table style="border-collapse: collapse;"><thead><tr><th>{}</th>{}</tr></thead><tbody>{}</tbody></table>"#,
                escape(&plot.x_label),
                header,
                rows
            )
        }
        None => String::new(),
    };

    format!(
        "{}{}<h2>Readings</h2>{}",
        form,
        plot,
        readings_table(binder.readings())
    )
}

fn readings_table(readings: &[crate::series::Reading]) -> String {
    let Some(columns) = columns_for(readings) else {
        return "<p>No readings.</p>".to_string();
    };
    let header: String = columns
        .iter()
        .map(|c| {
            format!(
                r#"<th style="padding: 0.5rem; text-align: left; min-width: {}px;">{}</th>"#,
                c.min_width,
                escape(&c.header_name)
            )
        })
        .collect();
    let rows: String = readings
        .iter()
        .map(|reading| {
            let cells: String = columns
                .iter()
                .map(|c| {
                    format!(
                        r#"<td style="padding: 0.5rem;">{}</td>"#,
                        escape(&cell_text(reading.get(&c.field)))
                    )
                })
                .collect();
            format!(r#"<tr style="border-bottom: 1px solid #dee2e6;">{}</tr>"#, cells)
        })
        .collect();
    format!(
        r#"<table style="width: 100%; border-collapse: collapse;"><thead><tr style="border-bottom: 2px solid #dee2e6;">{}</tr></thead><tbody>{}</tbody></table>"#,
        header, rows
    )
}

fn point(value: Option<f64>) -> String {
    match value {
        Some(v) if !v.is_nan() => v.to_string(),
        _ => String::new(),
    }
}

async fn devices_body(dashboard: &DashboardState) -> String {
    let state = dashboard.state.read().await;
    if state.devices.items.is_empty() {
        return "<p>No devices yet.</p>".to_string();
    }
    let rows: String = state
        .devices
        .items
        .iter()
        .map(|device| {
            let streams: Vec<&str> = device.streams.iter().map(|s| s.stream_id.as_str()).collect();
            format!(
                r#"<tr style="border-bottom: 1px solid #dee2e6;">
                    <td style="padding: 0.5rem;">{}</td>
                    <td style="padding: 0.5rem;">{}</td>
                    <td style="padding: 0.5rem;">{}</td>
                </tr>"#,
                escape(&device.device_id),
                escape(&streams.join(", ")),
                device_entry_count(device, &state.sensors.items)
            )
        })
        .collect();
    format!(
        r#"<table style="width: 100%; border-collapse: collapse;">
            <thead>
                <tr style="border-bottom: 2px solid #dee2e6;">
                    <th style="padding: 0.5rem; text-align: left;">Device</th>
                    <th style="padding: 0.5rem; text-align: left;">Streams</th>
                    <th style="padding: 0.5rem; text-align: left;">Entries</th>
                </tr>
            </thead>
            <tbody>{}</tbody>
        </table>"#,
        rows
    )
}

async fn permissions_body(dashboard: &DashboardState, term: Option<&str>) -> String {
    let state = dashboard.state.read().await;
    let term = term.unwrap_or("");
    let rows: String = filter_users(&state.users.items, term)
        .into_iter()
        .map(|user| {
            format!(
                r#"<tr style="border-bottom: 1px solid #dee2e6;">
                    <td style="padding: 0.5rem;">{}</td>
                    <td style="padding: 0.5rem;">{}</td>
                    <td style="padding: 0.5rem;">{}</td>
                    <td style="padding: 0.5rem;">{}</td>
                    <td style="padding: 0.5rem;">{}</td>
                </tr>"#,
                escape(&user.full_name()),
                escape(&user.user_id),
                escape(&user.email),
                escape(&user.role),
                escape(&user.aws_account_status)
            )
        })
        .collect();
    format!(
        r#"<form method="get"><input name="q" value="{}" placeholder="Search"> <button type="submit">Search</button></form>
        <table style="width: 100%; border-collapse: collapse;">
            <thead>
                <tr style="border-bottom: 2px solid #dee2e6;">
                    <th style="padding: 0.5rem; text-align: left;">Name</th>
                    <th style="padding: 0.5rem; text-align: left;">User ID</th>
                    <th style="padding: 0.5rem; text-align: left;">Email</th>
                    <th style="padding: 0.5rem; text-align: left;">Role</th>
                    <th style="padding: 0.5rem; text-align: left;">Cloud account</th>
                </tr>
            </thead>
            <tbody>{}</tbody>
        </table>"#,
        escape(term),
        rows
    )
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

// JSON API

async fn tools_handler(
    State(dashboard): State<DashboardState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let caller = dashboard.caller(&headers).await;
    let tools: Vec<serde_json::Value> = dashboard
        .visible_routes(caller.level)
        .iter()
        .map(|route| {
            json!({
                "name": route.tool.name,
                "icon": route.tool.icon,
                "kind": route.tool.kind,
                "href": route.href(),
                "pattern": route.pattern,
            })
        })
        .collect();
    Json(tools)
}

async fn sensors_handler(State(dashboard): State<DashboardState>, headers: HeaderMap) -> Response {
    if let Err(denied) = dashboard.admit(&headers, ToolKind::Sensors).await {
        return denied;
    }
    let snapshot = dashboard.state.read().await.sensors.clone();
    Json(snapshot).into_response()
}

/// Binder with `sensor_id` selected, or a 404 response
async fn bind_sensor(dashboard: &DashboardState, sensor_id: &str) -> Result<SeriesBinder, Response> {
    let records = dashboard.state.read().await.sensors.items.clone();
    let mut binder = SeriesBinder::new(records);
    binder.select_record(Some(sensor_id));
    if binder.selection().record.is_none() {
        return Err(json_error(
            StatusCode::NOT_FOUND,
            &format!("unknown sensor '{}'", sensor_id),
        ));
    }
    Ok(binder)
}

async fn fields_handler(
    State(dashboard): State<DashboardState>,
    headers: HeaderMap,
    Path(sensor_id): Path<String>,
) -> Response {
    if let Err(denied) = dashboard.admit(&headers, ToolKind::Sensors).await {
        return denied;
    }
    let binder = match bind_sensor(&dashboard, &sensor_id).await {
        Ok(binder) => binder,
        Err(response) => return response,
    };
    Json(json!({
        "sensor_id": sensor_id,
        "candidates": binder.candidates(),
        "secondary_available": binder.secondary_available(),
        "parse_error": binder.parse_error().map(|e| e.to_string()),
    }))
    .into_response()
}

#[derive(Debug, Default, Deserialize)]
struct SeriesQuery {
    field: Option<String>,
    field2: Option<String>,
}

async fn series_handler(
    State(dashboard): State<DashboardState>,
    headers: HeaderMap,
    Path(sensor_id): Path<String>,
    Query(query): Query<SeriesQuery>,
) -> Response {
    if let Err(denied) = dashboard.admit(&headers, ToolKind::Sensors).await {
        return denied;
    }
    let mut binder = match bind_sensor(&dashboard, &sensor_id).await {
        Ok(binder) => binder,
        Err(response) => return response,
    };

    let field = query.field.as_deref().filter(|f| !f.is_empty());
    let field2 = query.field2.as_deref().filter(|f| !f.is_empty());
    if !binder.select_primary(field) {
        return json_error(
            StatusCode::BAD_REQUEST,
            &format!("sensor '{}' has no field '{}'", sensor_id, field.unwrap_or("")),
        );
    }
    if !binder.select_secondary(field2) {
        return json_error(
            StatusCode::BAD_REQUEST,
            &format!("sensor '{}' has no field '{}'", sensor_id, field2.unwrap_or("")),
        );
    }

    Json(json!({
        "selection": binder.selection(),
        "candidates": binder.candidates(),
        "parse_error": binder.parse_error().map(|e| e.to_string()),
        "plot": binder.plot(),
    }))
    .into_response()
}

async fn devices_handler(State(dashboard): State<DashboardState>, headers: HeaderMap) -> Response {
    if let Err(denied) = dashboard.admit(&headers, ToolKind::Devices).await {
        return denied;
    }
    let snapshot = dashboard.state.read().await.devices.clone();
    Json(snapshot).into_response()
}

async fn create_device_handler(
    State(dashboard): State<DashboardState>,
    headers: HeaderMap,
    Json(request): Json<NewDevice>,
) -> Response {
    let session = match dashboard.admit(&headers, ToolKind::Devices).await {
        Ok(session) => session,
        Err(denied) => return denied,
    };
    if request.device_id.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "deviceId must not be empty");
    }
    let result = dashboard.api_for(&session).create_device(&request).await;
    dashboard
        .finish(&session, result, "Device created", "Error creating device")
        .await
}

async fn create_stream_handler(
    State(dashboard): State<DashboardState>,
    headers: HeaderMap,
    Json(request): Json<NewStream>,
) -> Response {
    let session = match dashboard.admit(&headers, ToolKind::Devices).await {
        Ok(session) => session,
        Err(denied) => return denied,
    };
    if request.device_id.trim().is_empty() || request.stream_id.trim().is_empty() {
        return json_error(
            StatusCode::BAD_REQUEST,
            "deviceId and streamId must not be empty",
        );
    }
    let result = dashboard
        .api_for(&session)
        .create_device_stream(&request)
        .await;
    dashboard
        .finish(&session, result, "Stream created", "Error creating stream")
        .await
}

async fn upload_handler(
    State(dashboard): State<DashboardState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let session = match dashboard.admit(&headers, ToolKind::Sensors).await {
        Ok(session) => session,
        Err(denied) => return denied,
    };
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");
    let result = dashboard
        .api_for(&session)
        .upload_file(content_type, &body)
        .await;
    dashboard
        .finish(&session, result, "Upload successful!", "Upload failed")
        .await
}

#[derive(Debug, Deserialize)]
struct UsersQuery {
    q: Option<String>,
}

async fn users_handler(
    State(dashboard): State<DashboardState>,
    headers: HeaderMap,
    Query(query): Query<UsersQuery>,
) -> Response {
    if let Err(denied) = dashboard.admit(&headers, ToolKind::Permissions).await {
        return denied;
    }
    let mut snapshot = dashboard.state.read().await.users.clone();
    if let Some(term) = query.q.as_deref() {
        let filtered: Vec<User> = filter_users(&snapshot.items, term)
            .into_iter()
            .cloned()
            .collect();
        snapshot.items = filtered;
    }
    Json(snapshot).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleChange {
    role: String,
    #[serde(default)]
    identity_id: Option<String>,
}

async fn update_role_handler(
    State(dashboard): State<DashboardState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(change): Json<RoleChange>,
) -> Response {
    let session = match dashboard.admit(&headers, ToolKind::Permissions).await {
        Ok(session) => session,
        Err(denied) => return denied,
    };
    match change.role.parse::<AccessLevel>() {
        Ok(AccessLevel::All) | Err(_) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                &format!("'{}' is not an assignable role", change.role),
            )
        }
        Ok(_) => {}
    }
    let identity_id = match change.identity_id {
        Some(id) => id,
        None => dashboard
            .find_user(&user_id)
            .await
            .map(|user| user.aws_account_status)
            .unwrap_or_default(),
    };
    let result = dashboard
        .api_for(&session)
        .update_permission(&user_id, &change.role, &identity_id)
        .await;
    dashboard
        .finish(
            &session,
            result,
            "Permission updated successfully!",
            "Error updating permission",
        )
        .await
}

#[derive(Debug, Deserialize)]
struct Approval {
    role: String,
}

async fn approve_account_handler(
    State(dashboard): State<DashboardState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(approval): Json<Approval>,
) -> Response {
    let session = match dashboard.admit(&headers, ToolKind::Permissions).await {
        Ok(session) => session,
        Err(denied) => return denied,
    };
    let Some(user) = dashboard.find_user(&user_id).await else {
        return json_error(
            StatusCode::NOT_FOUND,
            &format!("unknown user '{}'", user_id),
        );
    };
    let account = NewAccount {
        user_id: user.user_id,
        role: approval.role,
        email: user.email,
        first_name: user.first_name,
        last_name: user.last_name,
    };
    let result = dashboard.api_for(&session).create_account(&account).await;
    dashboard
        .finish(&session, result, "Account approved", "Error approving account")
        .await
}

async fn revoke_account_handler(
    State(dashboard): State<DashboardState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response {
    let session = match dashboard.admit(&headers, ToolKind::Permissions).await {
        Ok(session) => session,
        Err(denied) => return denied,
    };
    let identity_id = dashboard
        .find_user(&user_id)
        .await
        .map(|user| user.aws_account_status)
        .unwrap_or_default();
    let result = dashboard
        .api_for(&session)
        .delete_account(&user_id, &identity_id)
        .await;
    dashboard
        .finish(&session, result, "Account access revoked", "Error revoking access")
        .await
}

async fn request_account_handler(
    State(dashboard): State<DashboardState>,
    headers: HeaderMap,
) -> Response {
    let session = match dashboard.admit(&headers, ToolKind::Profile).await {
        Ok(session) => session,
        Err(denied) => return denied,
    };
    let result = dashboard
        .api_for(&session)
        .request_account(&session.user_id)
        .await;
    dashboard
        .finish(
            &session,
            result,
            "Successfully requested account",
            "Error requesting account access",
        )
        .await
}

async fn notices_handler(State(dashboard): State<DashboardState>, headers: HeaderMap) -> Response {
    let session = match dashboard.admit(&headers, ToolKind::Profile).await {
        Ok(session) => session,
        Err(denied) => return denied,
    };
    let state = dashboard.state.read().await;
    let notices: Vec<Notice> = state
        .notices
        .active(&session.user_id, current_epoch_ms())
        .into_iter()
        .cloned()
        .collect();
    Json(notices).into_response()
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::access::{default_tools, MockRoleResolver};
    use crate::api::tests::{client_with, ok};
    use crate::config::NoticeConfig;
    use crate::devices::Device;
    use crate::io::{HttpResponse, MockHttpClient};
    use crate::sensors::SensorRecord;
    use crate::session::test_token;
    use crate::state::new_state_handle;

    fn token() -> String {
        token_for("alice")
    }

    fn token_for(user: &str) -> String {
        test_token(&json!({"cognito:username": user}))
    }

    fn page_as(user: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token_for(user)))
            .body(Body::empty())
            .unwrap()
    }

    fn resolver(role: &'static str) -> MockRoleResolver {
        let mut mock = MockRoleResolver::new();
        mock.expect_resolve()
            .returning(move |_| Box::pin(async move { Ok(role.to_string()) }));
        mock
    }

    fn setup(resolver: MockRoleResolver, http: MockHttpClient) -> (Router, StateHandle) {
        let state = new_state_handle(&NoticeConfig::default());
        let dashboard = DashboardState {
            state: state.clone(),
            routes: Arc::new(RouteTable::build(default_tools(), "/dashboard")),
            resolver: Arc::new(resolver),
            api: client_with(http),
        };
        (build_router(dashboard), state)
    }

    async fn seed_sensor(state: &StateHandle) {
        let mut s = state.write().await;
        s.sensors.apply(
            1,
            vec![SensorRecord {
                sensor_id: "dht".to_string(),
                display_name: "Greenhouse".to_string(),
                data: r#"[{"timestamp":"1","temp":"20"},{"timestamp":"2","temp":"21"}]"#
                    .to_string(),
            }],
            0,
        );
    }

    fn request(method: &str, uri: &str, auth: bool, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if auth {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token()));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let (app, _) = setup(MockRoleResolver::new(), MockHttpClient::new());
        let response = app
            .oneshot(request("GET", "/health", false, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn root_redirects_to_dashboard() {
        let (app, _) = setup(MockRoleResolver::new(), MockHttpClient::new());
        let response = app.oneshot(request("GET", "/", false, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/dashboard");
    }

    #[tokio::test]
    async fn member_is_redirected_from_permissions_page() {
        let (app, _) = setup(resolver("member"), MockHttpClient::new());
        let response = app
            .oneshot(request("GET", "/dashboard/permissions", true, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/dashboard");
    }

    #[tokio::test]
    async fn anonymous_caller_is_redirected_without_role_lookup() {
        let mut mock = MockRoleResolver::new();
        mock.expect_resolve().never();
        let (app, _) = setup(mock, MockHttpClient::new());
        let response = app
            .oneshot(request("GET", "/dashboard/profile", false, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn admin_sees_filtered_permissions() {
        let (app, state) = setup(resolver("admin"), MockHttpClient::new());
        {
            let mut s = state.write().await;
            s.users.apply(
                1,
                vec![
                    User {
                        user_id: "bob".to_string(),
                        first_name: "Bob".to_string(),
                        role: "member".to_string(),
                        ..User::default()
                    },
                    User {
                        user_id: "carol".to_string(),
                        first_name: "Carol".to_string(),
                        role: "researcher".to_string(),
                        ..User::default()
                    },
                ],
                0,
            );
        }
        let response = app
            .oneshot(request("GET", "/dashboard/permissions?q=RESEARCH", true, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("carol"));
        assert!(!html.contains("bob"));
        assert!(html.contains(r#"href="/dashboard/permissions""#));
    }

    #[tokio::test]
    async fn sensor_detail_page_has_breadcrumbs_and_readings() {
        let (app, state) = setup(resolver("researcher"), MockHttpClient::new());
        seed_sensor(&state).await;
        let response = app
            .oneshot(request("GET", "/dashboard/sensors/dht?field=temp", true, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains(r#"<a href="/dashboard/sensors">Sensors</a>"#));
        assert!(html.contains("<span>Dht</span>"));
        assert!(html.contains("<th>temp</th>"));
        assert!(html.contains("Timestamp"));
    }

    #[tokio::test]
    async fn sensor_ids_are_decoded_and_linked_encoded() {
        let (app, state) = setup(resolver("researcher"), MockHttpClient::new());
        state.write().await.sensors.apply(
            1,
            vec![SensorRecord {
                sensor_id: "press 1".to_string(),
                display_name: String::new(),
                data: r#"[{"timestamp":"1","hpa":"1013"}]"#.to_string(),
            }],
            0,
        );

        let response = app
            .clone()
            .oneshot(request("GET", "/dashboard/sensors", true, None))
            .await
            .unwrap();
        let html = body_text(response).await;
        assert!(html.contains(r#"href="/dashboard/sensors/press%201""#));

        let response = app
            .clone()
            .oneshot(request("GET", "/dashboard/sensors/press%201?field=hpa", true, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(!html.contains("Unknown sensor"));
        assert!(html.contains("<th>hpa</th>"));
        assert!(html.contains(r#"action="/dashboard/sensors/press%201""#));

        let response = app
            .oneshot(request("GET", "/api/sensors/press%201/fields", true, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_dashboard_path_is_not_found() {
        let (app, _) = setup(MockRoleResolver::new(), MockHttpClient::new());
        let response = app
            .oneshot(request("GET", "/dashboard/nowhere", true, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn tools_api_lists_visible_tools() {
        let (app, _) = setup(resolver("researcher"), MockHttpClient::new());
        let response = app
            .oneshot(request("GET", "/api/tools", true, None))
            .await
            .unwrap();
        let json = body_json(response).await;
        let names: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Profile", "Sensors", "IoT Devices"]);
        assert_eq!(json[1]["pattern"], "/dashboard/sensors/*");
    }

    #[tokio::test]
    async fn users_api_is_forbidden_for_researcher() {
        let (app, _) = setup(resolver("researcher"), MockHttpClient::new());
        let response = app
            .oneshot(request("GET", "/api/users", true, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn series_api_derives_plot() {
        let (app, state) = setup(resolver("admin"), MockHttpClient::new());
        seed_sensor(&state).await;
        let response = app
            .oneshot(request("GET", "/api/sensors/dht/series?field=temp", true, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["plot"]["x"], json!([1.0, 2.0]));
        assert_eq!(json["plot"]["series"][0]["y"], json!([20.0, 21.0]));
        assert_eq!(json["plot"]["x_label"], "Time");
        assert_eq!(json["selection"]["record"], "dht");
    }

    #[tokio::test]
    async fn series_api_rejects_unknown_field() {
        let (app, state) = setup(resolver("admin"), MockHttpClient::new());
        seed_sensor(&state).await;
        let response = app
            .oneshot(request("GET", "/api/sensors/dht/series?field=hum", true, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn fields_api_for_unknown_sensor_is_not_found() {
        let (app, _) = setup(resolver("admin"), MockHttpClient::new());
        let response = app
            .oneshot(request("GET", "/api/sensors/missing/fields", true, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_device_forwards_caller_token_and_posts_notice() {
        let expected = token();
        let mut http = MockHttpClient::new();
        http.expect_post_json()
            .withf(move |url, headers, body| {
                url.ends_with("/devices/create")
                    && headers.contains(&("Authorization", expected.as_str()))
                    && body.contains(r#""deviceId":"press-1""#)
            })
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(ok("{}")) }));
        let (app, state) = setup(resolver("researcher"), http);

        let response = app
            .oneshot(request(
                "POST",
                "/api/devices",
                true,
                Some(json!({"deviceId": "press-1"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let s = state.read().await;
        let notices = s.notices.active("alice", current_epoch_ms());
        assert_eq!(notices[0].message, "Device created");
        assert_eq!(notices[0].kind, NoticeKind::Success);
    }

    #[tokio::test]
    async fn failed_stream_creation_posts_error_notice() {
        let mut http = MockHttpClient::new();
        http.expect_post_json().returning(|_, _, _| {
            Box::pin(async {
                Ok(HttpResponse {
                    status: 500,
                    body: "boom".to_string(),
                })
            })
        });
        let (app, state) = setup(resolver("admin"), http);

        let response = app
            .oneshot(request(
                "POST",
                "/api/devices/streams",
                true,
                Some(json!({"deviceId": "d-1", "streamId": "s-1"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(response).await;
        assert!(json["message"]
            .as_str()
            .unwrap()
            .starts_with("Error creating stream: "));
        assert_eq!(
            state.read().await.notices.active("alice", current_epoch_ms())[0].kind,
            NoticeKind::Error
        );
    }

    #[tokio::test]
    async fn notices_are_only_shown_to_their_author() {
        let mut http = MockHttpClient::new();
        http.expect_post_json().returning(|_, _, _| {
            Box::pin(async {
                Ok(HttpResponse {
                    status: 500,
                    body: "db password=hunter2".to_string(),
                })
            })
        });
        let (app, _) = setup(resolver("admin"), http);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/devices",
                true,
                Some(json!({"deviceId": "press-1"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let own = body_text(
            app.clone()
                .oneshot(page_as("alice", "/dashboard"))
                .await
                .unwrap(),
        )
        .await;
        assert!(own.contains("Error creating device"));

        let other = body_text(
            app.clone()
                .oneshot(page_as("bob", "/dashboard"))
                .await
                .unwrap(),
        )
        .await;
        assert!(!other.contains("hunter2"));

        let anonymous = body_text(
            app.clone()
                .oneshot(request("GET", "/dashboard", false, None))
                .await
                .unwrap(),
        )
        .await;
        assert!(!anonymous.contains("hunter2"));

        let response = app
            .oneshot(page_as("bob", "/api/notices"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn member_cannot_create_devices() {
        let mut http = MockHttpClient::new();
        http.expect_post_json().never();
        let (app, _) = setup(resolver("member"), http);
        let response = app
            .oneshot(request(
                "POST",
                "/api/devices",
                true,
                Some(json!({"deviceId": "d-1"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn role_change_uses_known_identity() {
        let mut http = MockHttpClient::new();
        http.expect_post_json()
            .withf(|url, _, body| {
                url.ends_with("/users/permission/update")
                    && body.contains(r#""userRole":"researcher""#)
                    && body.contains(r#""identityId":"us-east-1:abc""#)
            })
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(ok("")) }));
        let (app, state) = setup(resolver("admin"), http);
        state.write().await.users.apply(
            1,
            vec![User {
                user_id: "bob".to_string(),
                aws_account_status: "us-east-1:abc".to_string(),
                ..User::default()
            }],
            0,
        );

        let response = app
            .oneshot(request(
                "PUT",
                "/api/users/bob/role",
                true,
                Some(json!({"role": "researcher"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["message"], "Permission updated successfully!");
    }

    #[tokio::test]
    async fn wildcard_is_not_an_assignable_role() {
        let (app, _) = setup(resolver("admin"), MockHttpClient::new());
        let response = app
            .oneshot(request(
                "PUT",
                "/api/users/bob/role",
                true,
                Some(json!({"role": "*"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn devices_page_counts_entries() {
        let (app, state) = setup(resolver("researcher"), MockHttpClient::new());
        seed_sensor(&state).await;
        let device: Device =
            serde_json::from_value(json!({"deviceId": "rig", "streams": [{"streamId": "dht"}]}))
                .unwrap();
        state.write().await.devices.apply(1, vec![device], 0);

        let response = app
            .oneshot(request("GET", "/dashboard/devices", true, None))
            .await
            .unwrap();
        let html = body_text(response).await;
        assert!(html.contains(r#"<td style="padding: 0.5rem;">rig</td>"#));
        assert!(html.contains(r#"<td style="padding: 0.5rem;">2</td>"#));
    }

    #[test]
    fn escape_handles_markup() {
        assert_eq!(escape(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }
}
