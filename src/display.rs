//! Plain-text rendering for the terminal front end

use crate::model::{DbResult, DocsResult, Intent, Message, MessageStatus, ReplyPayload, Role};
use crate::state_machine::ChatState;
use serde_json::Value;
use std::fmt::Write;

/// Files listed before the rest is summarized
pub const VISIBLE_FILES: usize = 5;

pub fn intent_label(intent: Intent) -> &'static str {
    match intent {
        Intent::Generic => "Genérico",
        Intent::Db => "Dados",
        Intent::Docs => "Documentos",
    }
}

/// Shown in place of an error reply's raw text
pub fn error_explanation(intent: Intent) -> &'static str {
    match intent {
        Intent::Docs => "Nenhum arquivo válido encontrado no S3 ou leitura está indisponível. Tente novamente mais tarde.",
        Intent::Db => "Erro ao executar SQL ou banco de dados está indisponível. Tente novamente mais tarde.",
        Intent::Generic => "Erro a recuperar mensagem, agente de IA está fora do ar. Tente novamente mais tarde.",
    }
}

pub fn status_label(status: MessageStatus) -> Option<&'static str> {
    match status {
        MessageStatus::Pending => Some("Enviando..."),
        MessageStatus::Failed => Some("Falha no envio"),
        MessageStatus::Sent => None,
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn row_count(n: usize) -> String {
    if n == 1 {
        "1 linha".to_string()
    } else {
        format!("{n} linhas")
    }
}

pub fn render_db(result: &DbResult) -> String {
    let mut out = String::new();

    if let Some(sql) = &result.sql {
        let _ = writeln!(out, "Consulta SQL:\n  {sql}");
        if !result.params.is_empty() {
            let params: Vec<_> = result
                .params
                .iter()
                .map(|(k, v)| format!("{k}: {}", cell_text(v)))
                .collect();
            let _ = writeln!(out, "Parâmetros: {}", params.join(", "));
        }
    }

    let _ = writeln!(out, "Resultados ({})", row_count(result.rows.len()));
    if result.rows.is_empty() {
        out.push_str("Nenhum resultado encontrado.");
        return out;
    }

    let _ = writeln!(out, "  {}", result.columns.join(" | "));
    let lines: Vec<_> = result
        .rows
        .iter()
        .map(|row| {
            let cells: Vec<_> = row.iter().map(cell_text).collect();
            format!("  {}", cells.join(" | "))
        })
        .collect();
    out.push_str(&lines.join("\n"));
    out
}

pub fn render_docs(result: &DocsResult) -> String {
    let mut out = format!("Arquivos Consultados ({})", result.files.len());
    for file in result.files.iter().take(VISIBLE_FILES) {
        let _ = write!(out, "\n  - {file}");
    }
    if result.files.len() > VISIBLE_FILES {
        let _ = write!(out, "\n  Mostrar mais {} arquivos", result.files.len() - VISIBLE_FILES);
    }
    out
}

pub fn render_message(message: &Message) -> String {
    let time = message
        .created_at
        .with_timezone(&chrono::Local)
        .format("%H:%M");
    let mut out = match message.role {
        Role::User => format!("[{time}] Você"),
        Role::Assistant => {
            let intent = message.intent().unwrap_or_default();
            format!("[{time}] Assistente ({})", intent_label(intent))
        }
    };
    if let Some(label) = message.status.and_then(status_label) {
        let _ = write!(out, " · {label}");
    }
    out.push('\n');

    if let Some(error) = &message.error {
        out.push_str(error_explanation(error.intent));
        return out;
    }

    out.push_str(&message.content);
    match &message.reply {
        Some(ReplyPayload::Db(result)) => {
            out.push_str("\n\n");
            out.push_str(&render_db(result));
        }
        Some(ReplyPayload::Docs(result)) => {
            out.push_str("\n\n");
            out.push_str(&render_docs(result));
        }
        Some(ReplyPayload::Generic) | None => {}
    }
    out
}

/// The active thread, the streaming slot included
pub fn render_thread(state: &ChatState) -> String {
    let mut blocks: Vec<_> = state.thread().map(render_message).collect();
    if state.is_typing() {
        blocks.push("Assistente está digitando...".to_string());
    }
    blocks.join("\n\n")
}

/// Numbered conversation list, current one marked
pub fn render_conversations(state: &ChatState) -> String {
    if state.conversations.is_empty() {
        return "Nenhuma conversa.".to_string();
    }
    state
        .conversations
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let marker = if state.is_current(&c.id) { '*' } else { ' ' };
            format!("{marker} {}. {}", i + 1, c.title)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
