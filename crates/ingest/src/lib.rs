pub mod document;
pub mod embedding;
pub mod indexing;
pub mod metadata;
pub mod pipeline;
pub mod splitter;

pub use document::{DocumentLoader, LoadedDocument, LoaderChain, PageContent};
pub use embedding::{create_embedder, create_hybrid_embedder, Embedder, HybridEmbedder, QueryEncoding};
pub use indexing::{collect_files, IndexingError, IndexingService};
pub use metadata::{DocumentMetadata, MetadataExtractor};
pub use pipeline::{IngestionPipeline, IngestionReport, PipelineContext, PipelineStage};
pub use splitter::{SplitOutput, SplitterConfig, StructuralSplitter};
