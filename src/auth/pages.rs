//! Built-in sign-in and sign-out pages

use html_escape::{encode_double_quoted_attribute, encode_text};

use super::provider::ProviderInfo;

fn hidden_input(name: &str, value: &str) -> String {
    format!(
        "<input type=\"hidden\" name=\"{}\" value=\"{}\" />",
        encode_double_quoted_attribute(name),
        encode_double_quoted_attribute(value)
    )
}

fn error_message(code: &str) -> &'static str {
    match code {
        "OAuthSignin" | "OAuthCallback" | "Callback" => {
            "Try signing in with a different account."
        }
        "OAuthAccountNotLinked" => "To confirm your identity, sign in with the same account you used originally.",
        "SessionRequired" => "Please sign in to access this page.",
        _ => "Unable to sign in.",
    }
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width,initial-scale=1" />
  <title>{}</title>
</head>
<body>
  <main class="auth-card">
{}
  </main>
</body>
</html>
"#,
        encode_text(title),
        body
    )
}

/// GET /api/auth/signin
pub fn signin_page(
    providers: &[ProviderInfo],
    csrf_token: &str,
    callback_url: &str,
    error: Option<&str>,
) -> String {
    let mut body = String::new();

    if let Some(code) = error {
        body.push_str(&format!(
            "    <p class=\"error\">{}</p>\n",
            encode_text(error_message(code))
        ));
    }

    for provider in providers {
        body.push_str(&format!(
            "    <form action=\"{}\" method=\"POST\">\n      {}\n      {}\n      <button type=\"submit\">Sign in with {}</button>\n    </form>\n",
            encode_double_quoted_attribute(&provider.signin_url),
            hidden_input("csrfToken", csrf_token),
            hidden_input("callbackUrl", callback_url),
            encode_text(&provider.name)
        ));
    }

    layout("Sign In", &body)
}

/// GET /api/auth/signout
pub fn signout_page(action: &str, csrf_token: &str) -> String {
    let body = format!(
        "    <h1>Signout</h1>\n    <p>Are you sure you want to sign out?</p>\n    <form action=\"{}\" method=\"POST\">\n      {}\n      <button type=\"submit\">Sign out</button>\n    </form>\n",
        encode_double_quoted_attribute(action),
        hidden_input("csrfToken", csrf_token)
    );

    layout("Sign Out", &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn github() -> ProviderInfo {
        ProviderInfo {
            id: "github".to_string(),
            name: "GitHub".to_string(),
            kind: "oauth",
            signin_url: "http://localhost:3000/api/auth/signin/github".to_string(),
            callback_url: "http://localhost:3000/api/auth/callback/github".to_string(),
        }
    }

    #[test]
    fn signin_page_lists_providers_with_csrf_token() {
        let html = signin_page(&[github()], "tok", "http://localhost:3000/", None);
        assert!(html.contains("Sign in with GitHub"));
        assert!(html.contains("action=\"http://localhost:3000/api/auth/signin/github\""));
        assert!(html.contains("name=\"csrfToken\" value=\"tok\""));
        assert!(!html.contains("class=\"error\""));
    }

    #[test]
    fn signin_page_escapes_callback_url_and_shows_error() {
        let html = signin_page(&[github()], "tok", "\"><script>", Some("OAuthCallback"));
        assert!(!html.contains("\"><script>"));
        assert!(html.contains("class=\"error\""));
    }
}
