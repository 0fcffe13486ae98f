//! Seeds a drop from an existing brand's storefront, then asks the design
//! service to adapt it. Leave out the handles to see the error path.
//!
//! Usage: template_drop <template_brand> [handles...]

use dropwire::payloads::{
    topics, DesignFromTemplateRequest, ErrorReply, Event, Idea, IdeasGenerated, ReferenceAsset,
    StrategyBrief, TemplateSeedGenerated, TemplateSeedRequest,
};
use dropwire::{Client, Delivery, MemoryTransport, SessionConfig};
use serde_json::{Map, Value};
use std::env;
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> dropwire::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("Usage: {} <template_brand> [handles...]", args[0]);
        return Ok(());
    }
    let template_brand = args[1].clone();
    let handles = args[2..].to_vec();

    let transport = MemoryTransport::new();
    let services = Client::new(SessionConfig::default(), transport.clone())?;
    services.connect().await?;
    start_template_service(&services).await?;
    start_design_service(&services).await?;

    let client = Client::new(SessionConfig::from_env(), transport)?;
    client.connect().await?;
    let request_id = client.generate_request_id();

    let (tx, mut rx) = unbounded_channel();
    for filter in [
        topics::TEMPLATE_SEED_GENERATED,
        topics::IDEAS_GENERATED,
        topics::TEMPLATE_ERROR,
        topics::DESIGN_ERROR,
    ] {
        let tx = tx.clone();
        let mine = request_id.clone();
        client
            .subscribe(filter, move |d: &Delivery<'_>| {
                if d.is_reply_to(&mine) {
                    if let Ok(event) = d.event() {
                        let _ = tx.send(event);
                    }
                }
            })
            .await?;
    }

    client
        .publish(
            topics::TEMPLATE_SEED_REQUESTED,
            &TemplateSeedRequest {
                request_id: request_id.clone(),
                template_brand: template_brand.clone(),
                handles,
                items: vec!["hoodie".into(), "cap".into()],
            },
        )
        .await?;

    loop {
        let event = match timeout(REPLY_TIMEOUT, rx.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(_) => {
                println!("No reply within {REPLY_TIMEOUT:?}");
                break;
            }
        };
        match event {
            Event::TemplateSeedGenerated(seed) => {
                println!("Template: {}", seed.summary);
                println!(
                    "Positioning: {} / palette {}",
                    seed.strategy_brief.positioning,
                    seed.strategy_brief.palette.join(", ")
                );
                let brief = serde_json::to_value(&seed.strategy_brief)?;
                let strategy_brief: Map<String, Value> = match brief {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                client
                    .publish(
                        topics::DESIGN_FROM_TEMPLATE_REQUESTED,
                        &DesignFromTemplateRequest {
                            request_id: request_id.clone(),
                            template_brand: template_brand.clone(),
                            strategy_brief,
                            adaptation_notes: "keep the palette, change the voice".into(),
                            items: vec!["hoodie".into()],
                        },
                    )
                    .await?;
            }
            Event::IdeasGenerated(reply) => {
                for idea in reply.ideas {
                    println!("  {}: \"{}\" [{}]", idea.slug, idea.slogan, idea.style);
                }
                break;
            }
            Event::Failed { topic, error } => {
                println!("{topic}: {}", error.message);
                if let Some(detail) = error.detail {
                    println!("  {detail}");
                }
                break;
            }
            _ => {}
        }
    }

    client.disconnect().await?;
    services.disconnect().await
}

async fn start_template_service(services: &Client) -> dropwire::Result<()> {
    let out = services.clone();
    services
        .subscribe(topics::TEMPLATE_SEED_REQUESTED, move |d: &Delivery<'_>| {
            let Ok(request) = d.decode::<TemplateSeedRequest>() else {
                return;
            };
            let out = out.clone();
            tokio::spawn(async move {
                let result = if request.handles.is_empty() {
                    let reply = ErrorReply {
                        request_id: request.request_id,
                        message: "no product handles to learn from".into(),
                        detail: Some(format!("template brand {}", request.template_brand)),
                    };
                    out.publish(topics::TEMPLATE_ERROR, &reply).await
                } else {
                    let reply = TemplateSeedGenerated {
                        request_id: request.request_id,
                        summary: format!(
                            "{} sells {} with a quiet, premium voice",
                            request.template_brand,
                            request.items.join(" and ")
                        ),
                        reference_assets: request
                            .handles
                            .iter()
                            .map(|h| ReferenceAsset {
                                kind: "image".into(),
                                url: format!("https://cdn.example.com/{h}.jpg"),
                            })
                            .collect(),
                        strategy_brief: StrategyBrief {
                            positioning: "premium minimal".into(),
                            palette: vec!["#111111".into(), "#f4f1ea".into()],
                        },
                    };
                    out.publish(topics::TEMPLATE_SEED_GENERATED, &reply).await
                };
                if let Err(e) = result {
                    println!("Template service failed to reply: {e}");
                }
            });
        })
        .await?;
    Ok(())
}

async fn start_design_service(services: &Client) -> dropwire::Result<()> {
    let out = services.clone();
    services
        .subscribe(
            topics::DESIGN_FROM_TEMPLATE_REQUESTED,
            move |d: &Delivery<'_>| {
                let Ok(request) = d.decode::<DesignFromTemplateRequest>() else {
                    return;
                };
                let reply = IdeasGenerated {
                    request_id: request.request_id,
                    ideas: vec![Idea {
                        slug: format!("{}-remix", request.template_brand.to_lowercase()),
                        slogan: "Quiet Hours".into(),
                        style: request
                            .strategy_brief
                            .get("positioning")
                            .and_then(Value::as_str)
                            .unwrap_or("minimal")
                            .to_string(),
                    }],
                };
                let out = out.clone();
                tokio::spawn(async move {
                    if let Err(e) = out.publish(topics::IDEAS_GENERATED, &reply).await {
                        println!("Design service failed to reply: {e}");
                    }
                });
            },
        )
        .await?;
    Ok(())
}
