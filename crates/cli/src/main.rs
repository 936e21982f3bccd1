mod cli;
mod components;

use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use ccba_core::{Config, ContextRecord};
use ccba_llm::{ChainResponse, QueryRequest};
use ccba_retrieval::{RetrievalStats, RetrieveOptions, Retriever};

use crate::cli::{parse_filters, CliArgs, Command};
use crate::components::Components;

#[tokio::main]
async fn main() -> Result<()> {
    ccba_core::config::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    let config = match args.profile.as_deref() {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    config.log_summary();
    config.validate().context("invalid configuration")?;

    let components = Components::build(config).await?;

    match args.command {
        Command::Index { dir, drop } => {
            let service = components.indexing_service(true);
            let report = service
                .index_directory(&dir, drop)
                .await
                .with_context(|| format!("failed to index {}", dir.display()))?;
            println!("{}", serde_json::to_string_pretty(&report.summary)?);
            if report.summary.failed > 0 {
                for file in report.files.iter().filter(|f| !f.errors.is_empty()) {
                    eprintln!("{}: {}", file.file, file.errors.join("; "));
                }
            }
        }
        Command::Query {
            question,
            retrieval_query,
            top_k,
            top_n,
            filters,
            no_rerank,
            temperature,
            verify,
            json,
        } => {
            let chain = components.rag_chain()?;
            let request = QueryRequest {
                query: question,
                retrieval_query,
                history: Vec::new(),
                options: RetrieveOptions {
                    filters: parse_filters(&filters)?,
                    top_k,
                    top_n,
                    use_reranker: no_rerank.then_some(false),
                },
                temperature,
            };

            let response = if verify {
                chain.query_with_verification(&request).await?
            } else {
                chain.query(&request).await?
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_answer(&response)?;
            }
        }
        Command::Retrieve { question, top_k, top_n, filters, no_rerank, json } => {
            let options = RetrieveOptions {
                filters: parse_filters(&filters)?,
                top_k,
                top_n,
                use_reranker: no_rerank.then_some(false),
            };
            let (contexts, stats) = components.retriever().retrieve(&question, &options).await?;

            if json {
                let out = serde_json::json!({ "contexts": contexts, "stats": stats });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_retrieval(&contexts, &stats)?;
            }
        }
        Command::Delete { document_id } => {
            let removed = components.store.delete_by_document(&document_id).await?;
            info!(document_id = %document_id, removed, "deleted document");
            println!("removed {removed} chunks of {document_id}");
        }
        Command::Stats => {
            let documents = components.store.list_documents().await?;
            let stats = serde_json::json!({
                "store": components.store.name(),
                "chunks": components.store.count().await?,
                "documents": documents,
                "config": components.config.redacted_summary(),
            });
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}

fn print_answer(response: &ChainResponse) -> Result<()> {
    let mut out = std::io::stdout().lock();

    if let (Some(error), Some(kind)) = (&response.error, response.error_type) {
        writeln!(out, "Lỗi tạo câu trả lời ({kind}): {error}")?;
    } else {
        writeln!(out, "{}", response.answer)?;
    }

    if !response.contexts.is_empty() {
        writeln!(out, "\nNguồn:")?;
        write_sources(&mut out, &response.contexts)?;
    }

    if let Some(f) = &response.faithfulness {
        writeln!(out, "\nĐộ trung thực: {:?} ({:.1})", f.verdict, f.score)?;
    }

    let s = &response.stats;
    writeln!(
        out,
        "\n{} | fallback: {} | {:.0} ms (retrieval {:.0}, generation {:.0})",
        response.model.as_deref().unwrap_or("-"),
        response.used_fallback,
        s.total_ms,
        s.retrieval_ms,
        s.generation_ms
    )?;
    Ok(())
}

fn write_sources(out: &mut impl Write, contexts: &[ContextRecord]) -> std::io::Result<()> {
    for (i, ctx) in contexts.iter().enumerate() {
        writeln!(
            out,
            "  [{}] {} - {} (trang {}, {:.3})",
            i + 1,
            ctx.document_name,
            ctx.location(),
            ctx.page_number,
            ctx.relevance()
        )?;
    }
    Ok(())
}

fn print_retrieval(contexts: &[ContextRecord], stats: &RetrievalStats) -> Result<()> {
    let mut out = std::io::stdout().lock();

    if contexts.is_empty() {
        writeln!(out, "Không tìm thấy ngữ cảnh phù hợp.")?;
    } else {
        write_sources(&mut out, contexts)?;
        for (i, ctx) in contexts.iter().enumerate() {
            writeln!(out, "\n--- [{}] ---\n{}", i + 1, ctx.text)?;
        }
    }

    writeln!(
        out,
        "\n{} candidates → {} contexts | reranked: {} | cache hit: {} | {:.0} ms (encoding {:.0}, search {:.0}, rerank {:.0})",
        stats.candidates_count,
        stats.final_count,
        stats.reranked,
        stats.cache_hit,
        stats.total_ms,
        stats.encoding_ms,
        stats.retrieval_ms,
        stats.reranking_ms
    )?;
    Ok(())
}
