// nfviz/server/src/steps/network.rs

//! `create-network`: VPC, internal firewall rule, Cloud NAT and Private
//! Google Access, so Batch VMs can run without external addresses.

use crate::errors::AppError;
use crate::steps::common::wait_for_compute_operation;
use crate::steps::contexts::{NetworkCtxData, StepEnv};
use nfviz::external::{FirewallSpec, NetworkSpec, OperationScope, RouterSpec};
use nfviz::{Pipeline, StepContext, StepControl, StepRegistry, StepRequest};
use tracing::{event, Level};

pub const STEP_ID: &str = "create-network";

pub const NETWORK_NAME: &str = "default";
pub const SUBNETWORK_NAME: &str = "default";
pub const FIREWALL_NAME: &str = "default-allow-internal";
pub const INTERNAL_RANGE: &str = "10.128.0.0/9";
pub const ROUTER_NAME: &str = "nat-router";
pub const NAT_NAME: &str = "nat-config";

pub fn register_create_network(registry: &StepRegistry, env: &StepEnv) {
  let mut p = Pipeline::<NetworkCtxData, AppError>::new(&[
    ("ensure_network", false, None),
    ("ensure_firewall", false, None),
    ("ensure_nat_router", false, None),
    ("private_google_access", true, None),
    ("summarize_network", false, None),
  ]);

  p.on_step("ensure_network", |ctx: StepContext<NetworkCtxData>| async move {
    let env = ctx.read().env.clone();
    let network = env.cloud.network.clone();
    let project = env.run.project_id.as_str();

    ctx.events().info("Setting up VPC network for Google Batch...");
    match network.get_network(project, NETWORK_NAME).await {
      Ok(()) => {
        ctx.events().info("  ✓ Default VPC network already exists");
        return Ok(StepControl::Continue);
      }
      Err(e) if e.is_not_found() => {}
      Err(e) => return Err(AppError::from(e)),
    }

    ctx.events().info("  Creating default VPC network with auto-subnets...");
    let spec = NetworkSpec {
      name: NETWORK_NAME.to_string(),
      auto_create_subnetworks: true,
      routing_mode: "REGIONAL".to_string(),
    };
    match network.insert_network(project, &spec).await {
      Ok(op) => {
        if wait_for_compute_operation(&env, ctx.events(), OperationScope::Global, op, "network creation").await? {
          ctx.events().success("  ✓ Default VPC network created");
        } else {
          ctx.write().still_pending.push("network");
        }
      }
      Err(e) if e.is_already_exists() => ctx.events().info("  ✓ Default VPC network already exists"),
      Err(e) => return Err(AppError::from(e)),
    }
    Ok(StepControl::Continue)
  });

  p.on_step("ensure_firewall", |ctx: StepContext<NetworkCtxData>| async move {
    let env = ctx.read().env.clone();
    let network = env.cloud.network.clone();
    let project = env.run.project_id.as_str();

    match network.get_firewall(project, FIREWALL_NAME).await {
      Ok(()) => {
        ctx
          .events()
          .info(format!("  ✓ Firewall rule '{FIREWALL_NAME}' already exists"));
        return Ok(StepControl::Continue);
      }
      Err(e) if e.is_not_found() => {}
      Err(e) => return Err(AppError::from(e)),
    }

    ctx.events().info(format!("  Creating firewall rule '{FIREWALL_NAME}'..."));
    let spec = FirewallSpec {
      name: FIREWALL_NAME.to_string(),
      network: env.run.network_path(NETWORK_NAME),
      direction: "INGRESS".to_string(),
      priority: 1000,
      allowed_protocols: ["tcp", "udp", "icmp"].into_iter().map(String::from).collect(),
      source_ranges: vec![INTERNAL_RANGE.to_string()],
    };
    match network.insert_firewall(project, &spec).await {
      Ok(op) => {
        if wait_for_compute_operation(&env, ctx.events(), OperationScope::Global, op, "firewall rule creation").await? {
          ctx
            .events()
            .success(format!("  ✓ Firewall rule '{FIREWALL_NAME}' created"));
        } else {
          ctx.write().still_pending.push("firewall rule");
        }
      }
      Err(e) if e.is_already_exists() => {
        ctx
          .events()
          .info(format!("  ✓ Firewall rule '{FIREWALL_NAME}' already exists"))
      }
      Err(e) => return Err(AppError::from(e)),
    }
    Ok(StepControl::Continue)
  });

  p.on_step("ensure_nat_router", |ctx: StepContext<NetworkCtxData>| async move {
    let env = ctx.read().env.clone();
    let network = env.cloud.network.clone();
    let project = env.run.project_id.as_str();
    let region = env.run.region.as_str();

    match network.get_router(project, region, ROUTER_NAME).await {
      Ok(router) if router.nats.iter().any(|n| n == NAT_NAME) => {
        ctx
          .events()
          .info(format!("  ✓ Cloud NAT '{NAT_NAME}' already configured on '{ROUTER_NAME}'"));
        return Ok(StepControl::Continue);
      }
      Ok(router) => {
        // The router belongs to someone else's setup; leave it untouched.
        event!(Level::WARN, router = %router.name, nats = ?router.nats, "Router exists without the expected NAT.");
        ctx.events().info(format!(
          "  ⚠ Router '{ROUTER_NAME}' exists without NAT '{NAT_NAME}'; internal-only VMs may lack egress"
        ));
        return Ok(StepControl::Continue);
      }
      Err(e) if e.is_not_found() => {}
      Err(e) => return Err(AppError::from(e)),
    }

    ctx
      .events()
      .info(format!("  Creating Cloud Router '{ROUTER_NAME}' with NAT '{NAT_NAME}'..."));
    let spec = RouterSpec {
      name: ROUTER_NAME.to_string(),
      region: region.to_string(),
      network: env.run.network_path(NETWORK_NAME),
      nat_name: NAT_NAME.to_string(),
    };
    match network.insert_router(project, &spec).await {
      Ok(op) => {
        let scope = OperationScope::Region(region.to_string());
        if wait_for_compute_operation(&env, ctx.events(), scope, op, "Cloud NAT creation").await? {
          ctx.events().success(format!("  ✓ Cloud NAT '{NAT_NAME}' created"));
        } else {
          ctx.write().still_pending.push("Cloud NAT");
        }
      }
      Err(e) if e.is_already_exists() => {
        ctx
          .events()
          .info(format!("  ✓ Cloud Router '{ROUTER_NAME}' already exists"))
      }
      Err(e) => return Err(AppError::from(e)),
    }
    Ok(StepControl::Continue)
  });

  p.on_step("private_google_access", |ctx: StepContext<NetworkCtxData>| async move {
    let env = ctx.read().env.clone();
    let network = env.cloud.network.clone();
    let project = env.run.project_id.as_str();
    let region = env.run.region.as_str();

    ctx.events().info("  Enabling Private Google Access on subnet...");
    let subnet = network.get_subnetwork(project, region, SUBNETWORK_NAME).await?;
    if subnet.private_ip_google_access {
      ctx.events().info("  ✓ Private Google Access already enabled");
      return Ok(StepControl::Continue);
    }

    let op = network
      .enable_private_google_access(project, region, SUBNETWORK_NAME)
      .await?;
    let scope = OperationScope::Region(region.to_string());
    if wait_for_compute_operation(&env, ctx.events(), scope, op, "Private Google Access update").await? {
      ctx.events().success("  ✓ Private Google Access enabled");
    } else {
      ctx.write().still_pending.push("Private Google Access");
    }
    Ok::<_, AppError>(StepControl::Continue)
  });

  p.on_step("summarize_network", |ctx: StepContext<NetworkCtxData>| async move {
    let pending = ctx.read().still_pending.clone();
    ctx.events().info(format!("  Network: {NETWORK_NAME} (auto-subnets)"));
    ctx
      .events()
      .info(format!("  Firewall: Internal traffic allowed ({INTERNAL_RANGE})"));
    ctx.events().info(format!("  Cloud NAT: {NAT_NAME} on {ROUTER_NAME}"));
    if !pending.is_empty() {
      ctx
        .events()
        .info(format!("  Still in progress: {}", pending.join(", ")));
    }
    Ok::<_, AppError>(StepControl::Continue)
  });

  let env = env.clone();
  registry.register(STEP_ID, p, move |_req: &StepRequest| NetworkCtxData {
    env: env.clone(),
    still_pending: Vec::new(),
  });
}
