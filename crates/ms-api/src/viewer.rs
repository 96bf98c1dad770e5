//! Bundled viewer page and OpenAPI description

use axum::{Json, response::Html};
use serde_json::{Value, json};

/// Viewer index page
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// OpenAPI 3.0 document for every route
pub async fn openapi() -> Json<Value> {
    Json(openapi_document())
}

pub fn openapi_document() -> Value {
    let memory_list = json!({
        "description": "Non-archived memories",
        "content": {"application/json": {"schema": {
            "type": "array",
            "items": {"$ref": "#/components/schemas/Memory"}
        }}}
    });
    let status = json!({
        "description": "Write accepted",
        "content": {"application/json": {"schema": {"$ref": "#/components/schemas/StatusResponse"}}}
    });
    let bad_request = json!({
        "description": "Missing or malformed input",
        "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ErrorResponse"}}}
    });
    let write_body = json!({
        "required": true,
        "content": {"application/json": {"schema": {"$ref": "#/components/schemas/WriteMemoryRequest"}}}
    });

    json!({
        "openapi": "3.0.0",
        "info": {
            "title": "Memory Server API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "API for storing and managing versioned memories."
        },
        "paths": {
            "/save-memory": {"post": {
                "summary": "Append a new version of a memory",
                "requestBody": write_body,
                "responses": {"200": status, "400": bad_request}
            }},
            "/update-memory": {"post": {
                "summary": "Archive the current version and append a new one",
                "requestBody": write_body,
                "responses": {"200": status, "400": bad_request}
            }},
            "/delete-memory": {"post": {
                "summary": "Archive every version of a memory",
                "requestBody": {
                    "required": true,
                    "content": {"application/json": {"schema": {
                        "type": "object",
                        "required": ["memory_id"],
                        "properties": {"memory_id": {"type": "string"}}
                    }}}
                },
                "responses": {"200": status, "400": bad_request}
            }},
            "/list-memories": {"get": {
                "summary": "List non-archived memories",
                "responses": {"200": memory_list}
            }},
            "/list-memories-by-tag": {"get": {
                "summary": "List non-archived memories carrying a tag",
                "parameters": [{"name": "tag", "in": "query", "required": true, "schema": {"type": "string"}}],
                "responses": {"200": memory_list, "400": bad_request}
            }},
            "/get-memory-by-id/{memory_id}": {"get": {
                "summary": "Get the current version of a memory",
                "parameters": [{"name": "memory_id", "in": "path", "required": true, "schema": {"type": "string"}}],
                "responses": {
                    "200": {
                        "description": "Current version",
                        "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Memory"}}}
                    },
                    "404": {
                        "description": "No current version",
                        "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ErrorResponse"}}}
                    }
                }
            }},
            "/search-memories": {"get": {
                "summary": "Case-sensitive substring search over memory ids and content",
                "parameters": [{"name": "q", "in": "query", "required": false, "schema": {"type": "string"}}],
                "responses": {"200": memory_list}
            }},
            "/health": {"get": {
                "summary": "Health check",
                "responses": {"200": {"description": "Service is up"}}
            }},
            "/shutdown": {"post": {
                "summary": "Stop the server gracefully (when enabled)",
                "responses": {"200": {"description": "Shutdown started"}}
            }}
        },
        "components": {"schemas": {
            "Memory": {
                "type": "object",
                "properties": {
                    "id": {"type": "integer"},
                    "memory_id": {"type": "string"},
                    "version": {"type": "integer"},
                    "content": {"type": "string"},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "archived": {"type": "boolean"},
                    "created_at": {"type": "string", "format": "date-time"},
                    "updated_at": {"type": "string", "format": "date-time"}
                }
            },
            "WriteMemoryRequest": {
                "type": "object",
                "required": ["memory_id", "content"],
                "properties": {
                    "memory_id": {"type": "string"},
                    "content": {"type": "string"},
                    "tags": {"type": "array", "items": {"type": "string"}, "nullable": true}
                }
            },
            "StatusResponse": {
                "type": "object",
                "properties": {
                    "status": {"type": "string", "enum": ["saved", "updated", "archived"]},
                    "memory_id": {"type": "string"},
                    "version": {"type": "integer"}
                }
            },
            "ErrorResponse": {
                "type": "object",
                "properties": {
                    "error": {"type": "string"},
                    "detail": {"type": "string"}
                }
            }
        }}
    })
}

/// Index HTML template
const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Memory Server</title>
    <style>
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #f5f5f5;
            color: #333;
            line-height: 1.6;
        }
        .container { max-width: 1100px; margin: 0 auto; padding: 20px; }
        header { background: #2c3e50; color: white; padding: 20px; margin-bottom: 20px; }
        header h1 { font-size: 24px; }
        .panel {
            background: white;
            border-radius: 8px;
            padding: 20px;
            margin-bottom: 20px;
            box-shadow: 0 2px 4px rgba(0,0,0,0.1);
        }
        .row { display: flex; gap: 10px; margin-bottom: 10px; flex-wrap: wrap; }
        input, textarea { padding: 8px; border: 1px solid #ccc; border-radius: 4px; font: inherit; }
        input { flex: 1; min-width: 160px; }
        textarea { width: 100%; min-height: 90px; }
        button {
            background: #3498db;
            color: white;
            border: none;
            padding: 8px 16px;
            border-radius: 4px;
            cursor: pointer;
        }
        button:hover { background: #2980b9; }
        button.danger { background: #c0392b; }
        table { width: 100%; border-collapse: collapse; }
        th, td { padding: 10px; text-align: left; border-bottom: 1px solid #eee; vertical-align: top; }
        th { background: #f8f9fa; font-weight: 600; }
        td.content { white-space: pre-wrap; }
        .tag {
            display: inline-block;
            padding: 2px 6px;
            margin: 0 4px 4px 0;
            border-radius: 4px;
            font-size: 12px;
            background: #d4edda;
            color: #155724;
            cursor: pointer;
        }
        #message { min-height: 1.6em; color: #c0392b; }
    </style>
</head>
<body>
    <header>
        <h1>Memory Server</h1>
    </header>
    <div class="container">
        <div class="panel">
            <div class="row">
                <input id="memory-id" placeholder="memory_id">
                <input id="tags" placeholder="tags (comma separated)">
            </div>
            <textarea id="content" placeholder="content"></textarea>
            <div class="row" style="margin-top: 10px">
                <button onclick="writeMemory('/save-memory')">Save</button>
                <button onclick="writeMemory('/update-memory')">Update</button>
                <button class="danger" onclick="archive()">Archive</button>
            </div>
            <div id="message"></div>
        </div>

        <div class="panel">
            <div class="row">
                <input id="query" placeholder="search ids and content">
                <button onclick="search()">Search</button>
                <input id="tag-filter" placeholder="tag">
                <button onclick="byTag()">Filter by tag</button>
                <button onclick="loadAll()">All</button>
            </div>
            <table>
                <thead>
                    <tr>
                        <th>Memory</th>
                        <th>Version</th>
                        <th>Content</th>
                        <th>Tags</th>
                        <th>Updated</th>
                    </tr>
                </thead>
                <tbody id="memories-body"></tbody>
            </table>
        </div>
    </div>
    <script>
        function escapeHtml(value) {
            return String(value)
                .replace(/&/g, '&amp;')
                .replace(/</g, '&lt;')
                .replace(/>/g, '&gt;')
                .replace(/"/g, '&quot;')
                .replace(/'/g, '&#39;');
        }

        function showMessage(text) {
            document.getElementById('message').textContent = text || '';
        }

        async function request(path, options) {
            const res = await fetch(path, options);
            const body = await res.json();
            if (!res.ok) {
                throw new Error(body.detail || body.error || res.statusText);
            }
            return body;
        }

        function render(memories) {
            const tbody = document.getElementById('memories-body');
            tbody.innerHTML = memories.map(m => `
                <tr data-id="${escapeHtml(m.memory_id)}" onclick="edit(this.dataset.id)">
                    <td>${escapeHtml(m.memory_id)}</td>
                    <td>${m.version}</td>
                    <td class="content">${escapeHtml(m.content)}</td>
                    <td>${m.tags.map(t => `<span class="tag">${escapeHtml(t)}</span>`).join('')}</td>
                    <td>${new Date(m.updated_at).toLocaleString()}</td>
                </tr>
            `).join('');
        }

        async function show(path) {
            try {
                render(await request(path));
                showMessage('');
            } catch (e) {
                showMessage(e.message);
            }
        }

        function loadAll() {
            show('/list-memories');
        }

        function search() {
            const q = document.getElementById('query').value;
            show('/search-memories?q=' + encodeURIComponent(q));
        }

        function byTag() {
            const tag = document.getElementById('tag-filter').value;
            show('/list-memories-by-tag?tag=' + encodeURIComponent(tag));
        }

        async function edit(memoryId) {
            try {
                const m = await request('/get-memory-by-id/' + encodeURIComponent(memoryId));
                document.getElementById('memory-id').value = m.memory_id;
                document.getElementById('content').value = m.content;
                document.getElementById('tags').value = m.tags.join(', ');
            } catch (e) {
                showMessage(e.message);
            }
        }

        function formTags() {
            return document.getElementById('tags').value
                .split(',')
                .map(t => t.trim())
                .filter(t => t.length > 0);
        }

        async function writeMemory(path) {
            const payload = {
                memory_id: document.getElementById('memory-id').value,
                content: document.getElementById('content').value,
                tags: formTags()
            };
            try {
                const res = await request(path, {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/json' },
                    body: JSON.stringify(payload)
                });
                showMessage(`${res.status} ${res.memory_id} v${res.version}`);
                loadAll();
            } catch (e) {
                showMessage(e.message);
            }
        }

        async function archive() {
            const memoryId = document.getElementById('memory-id').value;
            try {
                await request('/delete-memory', {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/json' },
                    body: JSON.stringify({ memory_id: memoryId })
                });
                showMessage(`archived ${memoryId}`);
                loadAll();
            } catch (e) {
                showMessage(e.message);
            }
        }

        loadAll();
    </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_every_route() {
        let doc = openapi_document();
        let paths = doc["paths"].as_object().unwrap();
        for path in [
            "/save-memory",
            "/update-memory",
            "/delete-memory",
            "/list-memories",
            "/list-memories-by-tag",
            "/get-memory-by-id/{memory_id}",
            "/search-memories",
        ] {
            assert!(paths.contains_key(path), "missing {}", path);
        }
        assert_eq!(doc["openapi"], "3.0.0");
    }

    /// Function names called from `onclick="..."` attributes
    fn inline_handler_calls(html: &str) -> Vec<&str> {
        html.split("onclick=\"")
            .skip(1)
            .filter_map(|rest| rest.split('(').next())
            .collect()
    }

    #[test]
    fn test_inline_handlers_call_page_functions() {
        // Inline handlers resolve names on `document` before `window`
        const DOCUMENT_METHODS: &[&str] = &["write", "writeln", "open", "close", "clear"];

        let calls = inline_handler_calls(INDEX_HTML);
        assert!(calls.contains(&"writeMemory"));
        assert!(calls.contains(&"archive"));
        for name in calls {
            assert!(
                !DOCUMENT_METHODS.contains(&name),
                "onclick calls document.{}",
                name
            );
            assert!(
                INDEX_HTML.contains(&format!("function {}(", name)),
                "onclick calls undefined {}",
                name
            );
        }
    }

    #[test]
    fn test_index_escapes_content() {
        assert!(INDEX_HTML.contains("escapeHtml(m.content)"));
        assert!(INDEX_HTML.contains("/list-memories"));
    }
}
