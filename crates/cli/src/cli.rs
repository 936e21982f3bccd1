use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use ccba_storage::FilterValue;

/// Question answering over Vietnamese construction regulations.
#[derive(Parser, Debug)]
#[command(name = "ccba", version, about = "Index and query construction regulations (QCVN/TCVN)")]
pub struct CliArgs {
    /// Config profile; keys are read as {PROFILE}_{KEY} first.
    #[arg(long, global = true, env = "CCBA_PROFILE")]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Index every supported document under a directory.
    Index {
        dir: PathBuf,

        /// Drop the existing collection first.
        #[arg(long)]
        drop: bool,
    },

    /// Ask a question.
    Query {
        question: String,

        /// Search text, when it should differ from the question.
        #[arg(long)]
        retrieval_query: Option<String>,

        /// Candidates fetched from each search.
        #[arg(long)]
        top_k: Option<usize>,

        /// Contexts passed to the model.
        #[arg(long)]
        top_n: Option<usize>,

        /// Metadata filter, `field=value` or `field=a,b`. Repeatable.
        #[arg(long = "filter", value_name = "FIELD=VALUE")]
        filters: Vec<String>,

        #[arg(long)]
        no_rerank: bool,

        #[arg(long)]
        temperature: Option<f32>,

        /// Also ask the judge whether the answer is supported by the contexts.
        #[arg(long)]
        verify: bool,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the contexts a question retrieves, without generating an answer.
    Retrieve {
        question: String,

        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long)]
        top_n: Option<usize>,

        #[arg(long = "filter", value_name = "FIELD=VALUE")]
        filters: Vec<String>,

        #[arg(long)]
        no_rerank: bool,

        /// Print contexts and stats as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Remove a document's chunks.
    Delete { document_id: String },

    /// Show indexed documents and the active configuration.
    Stats,
}

/// `document_id=qcvn_06` or `article=3.2,3.3` into a filter map.
pub fn parse_filters(raw: &[String]) -> anyhow::Result<BTreeMap<String, FilterValue>> {
    let mut filters = BTreeMap::new();
    for item in raw {
        let Some((field, value)) = item.split_once('=') else {
            anyhow::bail!("invalid filter '{item}', expected FIELD=VALUE");
        };
        let values: Vec<String> =
            value.split(',').map(str::trim).filter(|v| !v.is_empty()).map(String::from).collect();
        let value = match values.len() {
            0 => anyhow::bail!("filter '{field}' has no value"),
            1 => FilterValue::One(values[0].clone()),
            _ => FilterValue::Many(values),
        };
        filters.insert(field.trim().to_string(), value);
    }
    Ok(filters)
}
