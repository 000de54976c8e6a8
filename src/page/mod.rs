//! Server-side page rendering
//!
//! A `PageBuild` is the active page template. Handlers render through the
//! `BuildHandle` so a development-mode reload is picked up by the next
//! request without restarting the server.

mod reload;

pub use reload::{BuildHandle, BuildWatcher, spawn_build_watcher};

use axum::{
    extract::State,
    http::{StatusCode, header::CACHE_CONTROL},
    response::{Html, IntoResponse, Response},
};
use html_escape::{encode_double_quoted_attribute, encode_text};
use crate::AppState;
use crate::config::PageConfig;
use crate::error::AppError;
use crate::session::{LoadedSession, PageData};

const DEFAULT_TEMPLATE: &str = include_str!("template.html");
const CONTENT_PLACEHOLDER: &str = "{{content}}";

/// A loaded page template
#[derive(Debug, Clone)]
pub struct PageBuild {
    template: String,
    title: String,
    description: String,
}

impl PageBuild {
    /// Load the configured template, or the embedded default
    ///
    /// # Errors
    /// Returns error if the template file cannot be read or lacks a
    /// `{{content}}` placeholder
    pub fn load(config: &PageConfig) -> Result<Self, AppError> {
        let template = match &config.template {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                AppError::Config(format!(
                    "failed to read page template {}: {e}",
                    path.display()
                ))
            })?,
            None => DEFAULT_TEMPLATE.to_string(),
        };

        if !template.contains(CONTENT_PLACEHOLDER) {
            return Err(AppError::Config(format!(
                "page template must contain {CONTENT_PLACEHOLDER}"
            )));
        }

        Ok(Self {
            template,
            title: config.title.clone(),
            description: config.description.clone(),
        })
    }

    /// Fill the template; `content` and `bootstrap` are inserted verbatim
    pub fn render(&self, content: &str, bootstrap: &str) -> String {
        self.template
            .replace("{{title}}", &encode_text(&self.title))
            .replace(
                "{{description}}",
                &encode_double_quoted_attribute(&self.description),
            )
            .replace("{{bootstrap}}", bootstrap)
            .replace(CONTENT_PLACEHOLDER, content)
    }
}

/// Script exposing the public base URL to browser code as `window.process.env`
pub fn bootstrap_script(public_url: &str) -> String {
    let env = serde_json::json!({ "env": { "NEXTAUTH_URL": public_url } });
    // `<` escaped so the JSON cannot close the script element
    let json = env.to_string().replace('<', "\\u003c");
    format!("<script>window.process = {json}</script>")
}

/// Body of the index page for the loader-derived `data`
pub fn index_content(data: &PageData) -> String {
    let session_json =
        serde_json::to_string_pretty(&data.session).unwrap_or_else(|_| "null".to_string());

    let link = if data.session.is_some() {
        r#"<a href="/api/auth/signout" class="underline">sign-out</a>"#
    } else {
        r#"<a href="/api/auth/signin" class="underline">sign-in link</a>"#
    };

    format!(
        r#"<div class="page">
  <section class="loader-session">
    <div>Using loader to get session info and links to the auth REST API endpoints to sign in and out.</div>
    {link}
    <pre>{session}</pre>
  </section>
  <section class="client-session">
    <div>Using the session endpoint from the browser to get session info and the sign-in and sign-out actions.</div>
    <button type="button" id="auth-button" hidden>Sign-in using GitHub</button>
    <pre id="client-session">null</pre>
  </section>
</div>
<script>{script}</script>"#,
        link = link,
        session = encode_text(&session_json),
        script = CLIENT_SCRIPT,
    )
}

const CLIENT_SCRIPT: &str = r#"
(async () => {
  const button = document.getElementById("auth-button");
  const pre = document.getElementById("client-session");
  const session = await fetch("/api/auth/session").then((r) => r.json()).catch(() => ({}));
  const signedIn = session && Object.keys(session).length > 0;
  pre.textContent = JSON.stringify(signedIn ? session : null, null, 2);
  button.textContent = signedIn ? "Sign-out using GitHub" : "Sign-in using GitHub";
  button.hidden = false;
  button.addEventListener("click", async () => {
    const { csrfToken } = await fetch("/api/auth/csrf").then((r) => r.json());
    const form = document.createElement("form");
    form.method = "POST";
    form.action = signedIn ? "/api/auth/signout" : "/api/auth/signin/github";
    for (const [name, value] of Object.entries({ csrfToken, callbackUrl: window.location.href })) {
      const input = document.createElement("input");
      input.type = "hidden";
      input.name = name;
      input.value = value;
      form.appendChild(input);
    }
    document.body.appendChild(form);
    form.submit();
  });
})();
"#;

/// GET /
pub async fn index(
    State(state): State<AppState>,
    LoadedSession(session): LoadedSession,
) -> Html<String> {
    let data = PageData { session };
    let build = state.build.current();

    Html(build.render(
        &index_content(&data),
        &bootstrap_script(&state.config.server.public_url),
    ))
}

/// Fallback for paths that are neither routes nor static files
pub async fn not_found(State(state): State<AppState>) -> Response {
    let build = state.build.current();
    let content = r#"<div class="page"><h1>404</h1><p>Page not found</p><a href="/">Home</a></div>"#;

    (
        StatusCode::NOT_FOUND,
        [(CACHE_CONTROL, "no-store")],
        Html(build.render(content, &bootstrap_script(&state.config.server.public_url))),
    )
        .into_response()
}
