//! BDD step definitions for route guard feature

use cucumber::{given, then, when};

use sensorhub::access::{AccessLevel, Decision, RouteTable, Tool, ToolKind};
use sensorhub::session::Session;

use crate::world::SensorhubWorld;

fn parse_levels(levels: &str) -> &'static [AccessLevel] {
    let parsed: Vec<AccessLevel> = levels
        .split(',')
        .map(|label| label.trim().parse::<AccessLevel>().expect("unknown access level"))
        .collect();
    Box::leak(parsed.into_boxed_slice())
}

fn kind_for(name: &str) -> ToolKind {
    match name {
        "Profile" => ToolKind::Profile,
        "Sensors" => ToolKind::Sensors,
        "IoT Devices" => ToolKind::Devices,
        "Permissions" => ToolKind::Permissions,
        other => panic!("Unknown tool: {}", other),
    }
}

fn tool(name: String, levels: &str, has_children: bool) -> Tool {
    let kind = kind_for(&name);
    let path = match kind {
        ToolKind::Devices => "devices".to_string(),
        _ => name.to_lowercase(),
    };
    Tool {
        name: Box::leak(name.into_boxed_str()),
        icon: "build",
        path: Box::leak(path.into_boxed_str()),
        kind,
        access_levels: parse_levels(levels),
        has_children,
    }
}

#[given(expr = "a tool {string} open to {string}")]
fn tool_open_to(world: &mut SensorhubWorld, name: String, levels: String) {
    world.tools.push(tool(name, &levels, false));
}

#[given(expr = "a tool {string} with children open to {string}")]
fn tool_with_children(world: &mut SensorhubWorld, name: String, levels: String) {
    world.tools.push(tool(name, &levels, true));
}

#[given(expr = "the caller has role {string}")]
fn caller_has_role(world: &mut SensorhubWorld, role: String) {
    world.role = Some(role);
}

#[given("the role lookup fails")]
fn role_lookup_fails(world: &mut SensorhubWorld) {
    world.role_lookup_fails = true;
}

#[when(expr = "the caller navigates to {string}")]
async fn navigate(world: &mut SensorhubWorld, path: String) {
    let table = RouteTable::build(&world.tools, "/dashboard");
    let route = table.match_path(&path).expect("no route for path");
    let session = Session {
        user_id: "alice".to_string(),
        id_token: "token".to_string(),
    };
    world.decision = Some(route.guard(Some(&session), &world.resolver()).await);
}

#[then(expr = "the caller is redirected to {string}")]
fn redirected_to(world: &mut SensorhubWorld, target: String) {
    assert_eq!(world.decision, Some(Decision::Redirect(target)));
}

#[then("the navigation is allowed")]
fn navigation_allowed(world: &mut SensorhubWorld) {
    assert_eq!(world.decision, Some(Decision::Allow));
}

#[then(expr = "the route pattern for {string} is {string}")]
fn route_pattern(world: &mut SensorhubWorld, name: String, pattern: String) {
    let table = RouteTable::build(&world.tools, "/dashboard");
    let route = table
        .routes()
        .iter()
        .find(|route| route.tool.name == name)
        .expect("no route for tool");
    assert_eq!(route.pattern, pattern);
}
