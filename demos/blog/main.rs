//! Blog example: articles served by the generic resource controller
//!
//! ```bash
//! cargo run --example blog
//! curl -H 'Accept: application/json' http://127.0.0.1:3000/articles
//! curl -X POST -H 'Content-Type: application/json' -H 'X-User-Roles: ROLE_BLOG_ARTICLE_CREATE' \
//!      -d '{"title": "Hello", "slug": "hello", "body": "First post"}' \
//!      'http://127.0.0.1:3000/articles?_format=json'
//! ```

use anyhow::Result;
use resource::prelude::*;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Article {
    id: Option<Uuid>,
    slug: String,
    title: String,
    body: String,
    status: String,
}

impl Default for Article {
    fn default() -> Self {
        Self {
            id: None,
            slug: String::new(),
            title: String::new(),
            body: String::new(),
            status: "draft".to_string(),
        }
    }
}

impl Resource for Article {
    fn resource_name() -> &'static str {
        "article"
    }

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn assign_id(&mut self, id: Uuid) {
        self.id = Some(id);
    }

    fn slug(&self) -> Option<&str> {
        Some(&self.slug)
    }
}

const RESOURCES: &str = r#"
resources:
  - name: article
    prefix: blog
    driver: in-memory
    templates: article
    template_overrides:
      create: article/form.html
      update: article/form.html
    pagination: { enabled: true, max_per_page: 5 }
    sorting: { title: asc }
    filterable: true
    sortable: true
    role_prefix: ROLE
    roles:
      show: ~
      index: ~
"#;

fn renderer() -> Result<TeraRenderer> {
    let mut renderer = TeraRenderer::empty();
    renderer.add_template(
        "article/layout.html",
        include_str!("templates/article/layout.html"),
    )?;
    renderer.add_template("article/index.html", include_str!("templates/article/index.html"))?;
    renderer.add_template("article/show.html", include_str!("templates/article/show.html"))?;
    renderer.add_template("article/form.html", include_str!("templates/article/form.html"))?;
    Ok(renderer)
}

fn listeners() -> EventDispatcher<Article> {
    let mut dispatcher = EventDispatcher::<Article>::new();
    dispatcher.on(LifecyclePhase::PreCreate, |event| {
        if event.resource.slug.is_empty() {
            let title = serde_json::Value::String(event.resource.title.clone());
            if let Some(slug) = filters::slugify()("slug", title)?.as_str() {
                event.resource.slug = slug.to_string();
            }
        }
        Ok(())
    });
    dispatcher.on(LifecyclePhase::PreDelete, |event| {
        if event.resource.status == "published" {
            event.stop("Published articles cannot be deleted.");
        }
        Ok(())
    });
    dispatcher
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,resource=debug")),
        )
        .init();

    let resources = ResourcesConfig::from_yaml_str(RESOURCES)?;
    resources.validate()?;
    let config = resources
        .get("article")
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("article is not configured"))?;

    let bus = EventBus::default();
    let mut changes = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(envelope) = changes.recv().await {
            tracing::info!(
                action = envelope.change.action(),
                id = ?envelope.change.resource_id(),
                "article changed"
            );
        }
    });

    let controller = ResourceController::<Article>::builder(config)
        .backend(Backend::InMemory)
        .checker(Arc::new(RoleChecker))
        .dispatcher(listeners())
        .form_rules(
            FieldRules::new()
                .field("title", |f| {
                    f.filter(filters::trim())
                        .validate(validators::required())
                        .validate(validators::string_length(1, 120))
                })
                .field("slug", |f| f.filter(filters::slugify()))
                .field("body", |f| f.filter(filters::trim()))
                .field("status", |f| {
                    f.filter(filters::lowercase())
                        .validate(validators::in_list(vec!["draft".into(), "published".into()]))
                }),
        )
        .renderer(Arc::new(renderer()?))
        .event_bus(bus)
        .build()?;

    let mut registry = ResourceRegistry::new();
    registry.register(controller);
    let app = registry.build_routes().layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    tracing::info!("blog listening on http://127.0.0.1:3000/articles");
    axum::serve(listener, app).await?;

    Ok(())
}
