use axum::{
    Json,
    extract::State,
    response::{Html, IntoResponse},
};
use maud::{DOCTYPE, PreEscaped, html};
use serde::Serialize;

use crate::AppState;

const CSS: &str = r#"
body { margin: 0; background: #0a0e1a; color: #d1d5db; font-family: ui-sans-serif, system-ui, sans-serif; }
header { display: flex; gap: 0.75rem; align-items: center; padding: 0.75rem 1rem; background: #16213e; }
header select, header input, header button { background: #0f3460; color: inherit; border: 1px solid #374151; border-radius: 4px; padding: 0.25rem 0.5rem; }
header input { width: 4rem; }
#status { margin-left: auto; font-size: 0.85rem; }
#status[data-state="running"] { color: #4ade80; }
#status[data-state="failed"], #status[data-state="disconnected"] { color: #f87171; }
#description { padding: 0.5rem 1rem; font-size: 0.85rem; color: #9ca3af; }
#terminal { padding: 1rem; }
"#;

/// Browser side of the bridge. The terminal keeps the size it was started
/// with; `started` hard-resets it and output is only written while running.
/// Only a failed start is shown as an error; any `exit` is neutral.
const CLIENT_JS: &str = r#"
(() => {
  const $ = (id) => document.getElementById(id);
  const status = $('status');
  const setStatus = (state, text) => { status.dataset.state = state; status.textContent = text; };

  let term = null;
  let state = 'connecting';
  let pendingDemo = null;

  const proto = location.protocol === 'https:' ? 'wss' : 'ws';
  const ws = new WebSocket(`${proto}://${location.host}/ws`);
  const send = (msg) => { if (ws.readyState === WebSocket.OPEN) ws.send(JSON.stringify(msg)); };

  const makeTerminal = (cols, rows) => {
    if (term) term.dispose();
    term = new Terminal({ cols, rows, convertEol: false, cursorBlink: true });
    term.open($('terminal'));
    term.onData((data) => { if (state === 'running') send({ type: 'input', data }); });
  };

  let opened = false;
  ws.onopen = () => { opened = true; setStatus('ready', 'Connected'); };
  ws.onclose = () => {
    // Never connected: keep showing the connecting state
    if (!opened) return;
    state = 'disconnected';
    setStatus('disconnected', 'Disconnected');
  };
  ws.onmessage = (event) => {
    let msg;
    try { msg = JSON.parse(event.data); } catch (_) { return; }
    switch (msg.type) {
      case 'demos': {
        const picker = $('demo');
        picker.innerHTML = '';
        for (const name of msg.list) {
          const option = document.createElement('option');
          option.value = name; option.textContent = name;
          picker.appendChild(option);
        }
        state = 'ready';
        break;
      }
      case 'started':
        if (term) term.reset();
        state = 'running';
        setStatus('running', `Running ${msg.demo}`);
        break;
      case 'output':
        if (state === 'running' && term) term.write(msg.data);
        break;
      case 'exit':
        state = 'exited';
        setStatus('exited', msg.code === null ? 'Terminated' : `Exited with code ${msg.code}`);
        break;
      case 'error':
        if (state === 'starting') {
          state = 'failed';
          setStatus('failed', `Failed to start ${pendingDemo}: ${msg.message}`);
        } else {
          setStatus(status.dataset.state, `${status.textContent} (${msg.message})`);
        }
        break;
    }
  };

  $('start').onclick = () => {
    const cols = parseInt($('cols').value, 10);
    const rows = parseInt($('rows').value, 10);
    pendingDemo = $('demo').value;
    makeTerminal(cols, rows);
    state = 'starting';
    setStatus('starting', `Starting ${pendingDemo}...`);
    send({ type: 'start', demo: pendingDemo, cols, rows });
  };
  $('stop').onclick = () => send({ type: 'stop' });
  window.addEventListener('beforeunload', () => send({ type: 'stop' }));
})();
"#;

pub async fn index_page(State(state): State<AppState>) -> impl IntoResponse {
    let demos = state.launcher.demos();

    let markup = html! {
        (DOCTYPE)
        html {
            head {
                title { "Demo Bridge" }
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/xterm@5.3.0/css/xterm.css";
                script src="https://cdn.jsdelivr.net/npm/xterm@5.3.0/lib/xterm.js" {}
                style { (PreEscaped(CSS)) }
            }
            body {
                header {
                    strong { "Demo Bridge" }
                    select id="demo" {
                        @for name in &demos {
                            option value=(name) { (name) }
                        }
                    }
                    label { "cols " input id="cols" type="number" min="1" value="80"; }
                    label { "rows " input id="rows" type="number" min="1" value="24"; }
                    button id="start" { "Start" }
                    button id="stop" { "Stop" }
                    span id="status" data-state="connecting" { "Connecting..." }
                }
                @if demos.is_empty() {
                    div id="description" { "No demos are configured. Add [demos.<name>] tables to the config file." }
                } @else {
                    ul id="description" {
                        @for name in &demos {
                            li {
                                code { (name) }
                                @if let Some(description) = state.launcher.description(name) {
                                    " " (description)
                                }
                            }
                        }
                    }
                }
                div id="terminal" {}
                script { (PreEscaped(CLIENT_JS)) }
            }
        }
    };

    Html(markup.into_string())
}

#[derive(Debug, Serialize)]
pub struct DemoSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub async fn list_demos(State(state): State<AppState>) -> Json<Vec<DemoSummary>> {
    let demos = state
        .launcher
        .demos()
        .into_iter()
        .map(|name| DemoSummary {
            description: state.launcher.description(&name),
            name,
        })
        .collect();
    Json(demos)
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "demos": state.launcher.demos().len(),
    }))
}
