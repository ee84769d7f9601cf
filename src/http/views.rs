//! Axum handlers for every route.

use std::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::Uri;
use axum::response::{Html, IntoResponse, Response};

use crate::engine::SummaryStyle;
use crate::error::RequestError;
use crate::http::dispatch::{stream_summary, DatasetSource, QueryParams, QueryStyle, StreamHandler};
use crate::http::qmacro::QueryMacroResolver;
use crate::http::request::QueryForm;
use crate::http::response::{error_response, full_response, stream_response, ResponseHead};
use crate::http::server::ServerState;
use crate::http::staging::StagingArea;

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{title}</title></head>\n<body>\n<h1>{title}</h1>\n{body}</body>\n</html>\n",
        title = escape(title),
        body = body,
    ))
}

fn lookup(state: &ServerState, name: &str) -> Result<DatasetSource, RequestError> {
    state
        .cfg
        .get(name)
        .map(|section| DatasetSource::dataset(name, section, &state.url))
        .ok_or_else(|| RequestError::not_found(format!("Dataset {} not found", name)))
}

fn summary_style(form: &QueryForm) -> Result<SummaryStyle, RequestError> {
    form.get_or("style", "")
        .trim()
        .parse()
        .map_err(RequestError::NotFound)
}

pub async fn index(State(state): State<ServerState>) -> Html<String> {
    let mut body = String::from("<p>Available datasets:</p>\n<ul>\n");
    for name in state.cfg.names() {
        let _ = writeln!(
            body,
            "<li><a href=\"/dataset/{0}\">{0}</a></li>",
            escape(name)
        );
    }
    body.push_str("</ul>\n<p><a href=\"/query\">Perform a query</a></p>\n");
    page("Dataset index", &body)
}

pub async fn config(State(state): State<ServerState>) -> Response {
    full_response(
        ResponseHead::attachment("text/plain", "config"),
        state.remote_cfg.to_string(),
    )
}

pub async fn qexpand(State(state): State<ServerState>, form: QueryForm) -> Response {
    let query = form.get_or("query", "").trim().to_string();
    let engine = Arc::clone(&state.engine);
    stream_response("qexpand", ResponseHead::new("text/plain"), move |out| {
        let expanded = engine.expand_query(&query)?;
        out.send_headers()?;
        writeln!(out, "{}", expanded)?;
        Ok(())
    })
    .await
}

pub async fn aliases(State(state): State<ServerState>) -> Response {
    let engine = Arc::clone(&state.engine);
    stream_response("aliases", ResponseHead::new("text/plain"), move |out| {
        let aliases = engine.alias_database()?;
        out.send_headers()?;
        out.write_all(aliases.as_bytes())?;
        Ok(())
    })
    .await
}

pub async fn dataset_index(State(state): State<ServerState>, Path(name): Path<String>) -> Response {
    let Some(section) = state.remote_cfg.get(&name) else {
        return error_response(&RequestError::not_found(format!("Dataset {} not found", name)));
    };

    let title = format!("Dataset {}", name);
    let name = escape(&name);
    let mut body = String::new();
    let _ = writeln!(body, "<ul>");
    let _ = writeln!(body, "<li><a href=\"/dataset/{0}/summary\">Download summary</a></li>", name);
    let _ = writeln!(body, "<li><a href=\"/dataset/{0}/config\">Download configuration</a></li>", name);
    let _ = writeln!(body, "<li><a href=\"/\">All datasets</a></li>");
    let _ = writeln!(body, "</ul>");
    let _ = writeln!(body, "<pre>");
    for (k, v) in section.iter() {
        let _ = writeln!(body, "{} = {}", escape(k), escape(v));
    }
    let _ = writeln!(body, "</pre>");
    page(&title, &body).into_response()
}

pub async fn dataset_config(State(state): State<ServerState>, Path(name): Path<String>) -> Response {
    match state.remote_cfg.get(&name) {
        Some(section) => full_response(
            ResponseHead::attachment("text/plain", format!("{}.config", name)),
            format!("[{}]\n{}", name, section),
        ),
        None => error_response(&RequestError::not_found(format!("Dataset {} not found", name))),
    }
}

async fn serve_summary(
    state: ServerState,
    source: DatasetSource,
    form: QueryForm,
    short: bool,
) -> Response {
    let style = match summary_style(&form) {
        Ok(style) => style,
        Err(err) => return error_response(&err),
    };
    let matcher = form.get_or("query", "").trim().to_string();
    let head = ResponseHead::attachment(style.content_type(), source.filename("summary"));
    let view = if short { "summaryshort" } else { "summary" };
    let engine = Arc::clone(&state.engine);
    stream_response(view, head, move |out| {
        stream_summary(engine.as_ref(), &source, &matcher, style, short, out)
    })
    .await
}

pub async fn dataset_summary(
    State(state): State<ServerState>,
    Path(name): Path<String>,
    form: QueryForm,
) -> Response {
    match lookup(&state, &name) {
        Ok(source) => serve_summary(state, source, form, false).await,
        Err(err) => error_response(&err),
    }
}

pub async fn dataset_summary_short(
    State(state): State<ServerState>,
    Path(name): Path<String>,
    form: QueryForm,
) -> Response {
    match lookup(&state, &name) {
        Ok(source) => serve_summary(state, source, form, true).await,
        Err(err) => error_response(&err),
    }
}

pub async fn macro_summary(State(state): State<ServerState>, form: QueryForm) -> Response {
    let query = QueryMacroResolver::new(&state.cfg, &state.url).resolve(&form);
    serve_summary(state, DatasetSource::Macro(query), form, false).await
}

async fn serve_query(state: ServerState, source: DatasetSource, form: QueryForm) -> Response {
    let style = match QueryStyle::parse(form.get_or("style", "").trim()) {
        Ok(style) => style,
        Err(err) => return error_response(&err),
    };
    let handler = StreamHandler::new(style, source, QueryParams::from_form(&form));
    tracing::debug!(
        style = %handler.style,
        query = %handler.params.query,
        uploads = form.files.len(),
        "Dispatching query"
    );

    let head = handler.head();
    let uploads = if style == QueryStyle::Postprocess {
        form.files
    } else {
        Vec::new()
    };
    let engine = Arc::clone(&state.engine);
    let url = state.url.clone();
    let staging_root = state.staging_root.clone();

    stream_response(style.name(), head, move |out| {
        let staging = if uploads.is_empty() {
            None
        } else {
            Some(StagingArea::stage(staging_root.as_deref(), &uploads)?)
        };
        handler.stream(engine.as_ref(), &url, staging.as_ref(), out)
    })
    .await
}

pub async fn dataset_query(
    State(state): State<ServerState>,
    Path(name): Path<String>,
    form: QueryForm,
) -> Response {
    match lookup(&state, &name) {
        Ok(source) => serve_query(state, source, form).await,
        Err(err) => error_response(&err),
    }
}

pub async fn macro_query(State(state): State<ServerState>, form: QueryForm) -> Response {
    let query = QueryMacroResolver::new(&state.cfg, &state.url).resolve(&form);
    serve_query(state, DatasetSource::Macro(query), form).await
}

pub async fn not_found(uri: Uri) -> Response {
    error_response(&RequestError::not_found(format!("{} not found", uri.path())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }
}
