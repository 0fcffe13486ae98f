//! Walks one "from scratch" drop through the design, image and storefront
//! services, all hosted on an in-process broker.
//!
//! Usage: design_drop <brand> <vibe> [items...]

use dropwire::payloads::{
    topics, DesignRequest, Event, Idea, IdeasGenerated, ImageGenerated, ImageOutput,
    ImageRequest, ProductCreated,
};
use dropwire::{facade, Client, Delivery, MemoryTransport, RequestId, SessionConfig};
use std::env;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> dropwire::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        println!("Usage: {} <brand> <vibe> [items...]", args[0]);
        return Ok(());
    }
    let brand = args[1].clone();
    let vibe = args[2].clone();
    let items: Vec<String> = if args.len() > 3 {
        args[3..].to_vec()
    } else {
        vec!["tshirt".to_string()]
    };

    let transport = MemoryTransport::new();
    start_services(&transport).await?;

    facade::install(Client::new(SessionConfig::from_env(), transport)?)?;
    facade::connect().await?;

    let request_id = facade::generate_request_id();
    let mut replies = listen(&request_id).await?;

    println!("Requesting ideas for {brand} ({vibe})");
    facade::publish(
        topics::DESIGN_REQUESTED,
        &DesignRequest {
            request_id: request_id.clone(),
            brand,
            vibe,
            items: items.clone(),
        },
    )
    .await?;

    while let Some(event) = replies.recv().await {
        match event {
            Event::IdeasGenerated(reply) => {
                for idea in &reply.ideas {
                    println!("  idea {}: \"{}\" [{}]", idea.slug, idea.slogan, idea.style);
                }
                let Some(idea) = reply.ideas.into_iter().next() else {
                    println!("No ideas came back");
                    break;
                };
                println!("Rendering \"{}\" on a {}", idea.slogan, items[0]);
                facade::publish(
                    topics::IMAGE_REQUESTED,
                    &ImageRequest {
                        request_id: request_id.clone(),
                        idea,
                        item: items[0].clone(),
                        output: ImageOutput {
                            kind: "png".into(),
                            transparent: true,
                        },
                    },
                )
                .await?;
            }
            Event::ImageGenerated(reply) => {
                println!("Asset: {}", reply.asset_url);
                println!("Mockup: {}", reply.mockup_url);
            }
            Event::ProductCreated(reply) => {
                println!("Product {} live at {}", reply.product_id, reply.product_url);
                println!("Checkout: {}", reply.checkout_url);
                break;
            }
            Event::Failed { topic, error } => {
                println!("{topic}: {}", error.message);
                break;
            }
            Event::TemplateSeedGenerated(_) => {}
        }
    }

    facade::disconnect().await
}

/// Route replies for `request_id` into a channel as typed events
async fn listen(request_id: &RequestId) -> dropwire::Result<UnboundedReceiver<Event>> {
    let (tx, rx) = unbounded_channel();
    for filter in [
        topics::IDEAS_GENERATED,
        topics::IMAGE_GENERATED,
        topics::PRODUCT_CREATED,
        "ai/*/error",
        topics::PRODUCT_ERROR,
    ] {
        let tx = tx.clone();
        let mine = request_id.clone();
        facade::subscribe(filter, move |d: &Delivery<'_>| {
            if !d.is_reply_to(&mine) {
                return;
            }
            match d.event() {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => println!("Unreadable reply on {}: {}", d.topic(), e),
            }
        })
        .await?;
    }
    Ok(rx)
}

/// Stand-ins for the design, image and storefront services
async fn start_services(transport: &MemoryTransport) -> dropwire::Result<()> {
    let services = Client::new(SessionConfig::default(), transport.clone())?;
    services.connect().await?;

    let out = services.clone();
    services
        .subscribe(topics::DESIGN_REQUESTED, move |d: &Delivery<'_>| {
            let Ok(request) = d.decode::<DesignRequest>() else {
                return;
            };
            let ideas = ["Ship It", "Stay Loud", "Made Late"]
                .iter()
                .enumerate()
                .map(|(i, slogan)| Idea {
                    slug: format!("{}-{}", request.brand.to_lowercase(), i + 1),
                    slogan: slogan.to_string(),
                    style: request.vibe.clone(),
                })
                .collect();
            let reply = IdeasGenerated {
                request_id: request.request_id,
                ideas,
            };
            reply_on(&out, topics::IDEAS_GENERATED, reply);
        })
        .await?;

    let out = services.clone();
    services
        .subscribe(topics::IMAGE_REQUESTED, move |d: &Delivery<'_>| {
            let Ok(request) = d.decode::<ImageRequest>() else {
                return;
            };
            let base = format!("https://assets.example.com/{}", request.idea.slug);
            let reply = ImageGenerated {
                request_id: request.request_id,
                asset_url: format!("{base}.{}", request.output.kind),
                mockup_url: format!("{base}-{}-mockup.jpg", request.item),
            };
            reply_on(&out, topics::IMAGE_GENERATED, reply);
        })
        .await?;

    let out = services.clone();
    services
        .subscribe(topics::IMAGE_GENERATED, move |d: &Delivery<'_>| {
            let Ok(image) = d.decode::<ImageGenerated>() else {
                return;
            };
            let suffix: String = image
                .request_id
                .as_str()
                .trim_start_matches("req_")
                .chars()
                .take(8)
                .collect();
            let product_id = format!("prod_{suffix}");
            let reply = ProductCreated {
                request_id: image.request_id,
                product_url: format!("https://shop.example.com/products/{product_id}"),
                checkout_url: format!("https://shop.example.com/checkout/{product_id}"),
                product_id,
            };
            reply_on(&out, topics::PRODUCT_CREATED, reply);
        })
        .await?;

    Ok(())
}

fn reply_on<T: serde::Serialize + Send + Sync + 'static>(client: &Client, topic: &'static str, reply: T) {
    let client = client.clone();
    tokio::spawn(async move {
        if let Err(e) = client.publish(topic, &reply).await {
            println!("Service failed to publish on {topic}: {e}");
        }
    });
}
