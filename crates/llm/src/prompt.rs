//! Prompt templates for grounded answers and the faithfulness judge.

use ccba_core::{truncate_chars, ContextRecord};

use crate::provider::{Message, Role};

/// Prior turns carried into a new prompt.
pub const HISTORY_TURNS: usize = 5;
/// Per-context text budget in the answer prompt.
pub const CONTEXT_TEXT_CHARS: usize = 2000;
pub const JUDGE_CONTEXTS: usize = 5;
pub const JUDGE_CONTEXT_CHARS: usize = 500;
pub const JUDGE_ANSWER_CHARS: usize = 1000;

pub const NO_CONTEXT_TEXT: &str = "Không có ngữ cảnh liên quan được tìm thấy.";

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "\
[ROLE DEFINITION]
Bạn là một Chuyên gia cao cấp về Quy chuẩn & Tiêu chuẩn Xây dựng tại Việt Nam (CCBA Expert). Nhiệm vụ của bạn là tư vấn kỹ thuật chính xác dựa trên bằng chứng thực tế được cung cấp.

[METHODOLOGY - RASE]
Để đảm bảo tính chính xác và đầy đủ, hãy áp dụng tư duy RASE khi phân tích các điều khoản:
1. Requirement (Yêu cầu): Quy định bắt buộc là gì? (Phải/Không được/Cho phép)
2. Applicability (Phạm vi): Quy định này áp dụng cho đối tượng nào?
3. Selection (Điều kiện): Trong hoàn cảnh/điều kiện cụ thể nào?
4. Exception (Ngoại lệ): Có trường hợp nào được miễn trừ không?

[INSTRUCTIONS]
1. Chỉ sử dụng thông tin trong phần [CONTEXT DATA] để trả lời. Nếu không có thông tin, hãy nói \"Quy chuẩn hiện tại trong cơ sở dữ liệu chưa đề cập rõ vấn đề này\".
2. Trích dẫn nguồn cụ thể (Tên QCVN, Điều, Khoản) cho từng nhận định quan trọng.
3. Khi giải thích quy định, hãy làm rõ Phạm vi áp dụng và các Ngoại lệ (nếu có).
4. Phong cách trả lời: Chuyên nghiệp, Khách quan, Gãy gọn, tuân thủ văn phong kỹ thuật.
5. KHÔNG tự suy diễn hoặc thêm thông tin bên ngoài ngữ cảnh được cung cấp.
6. Nếu câu trả lời chứa dữ liệu dạng bảng (ví dụ: các thông số kỹ thuật, phân loại), hãy trình bày dưới dạng bảng Markdown để dễ đọc.
";

/// `Điều 5, Khoản 2`, or `N/A` when the context has neither.
fn article_ref(ctx: &ContextRecord) -> String {
    let mut parts = Vec::new();
    if let Some(article) = ctx.article.as_deref().filter(|a| !a.is_empty()) {
        parts.push(format!("Điều {article}"));
    }
    if let Some(clause) = ctx.clause.as_deref().filter(|c| !c.is_empty()) {
        parts.push(format!("Khoản {clause}"));
    }
    if parts.is_empty() {
        "N/A".to_string()
    } else {
        parts.join(", ")
    }
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_instruction: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self { system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string() }
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    /// Numbered source blocks, most relevant first.
    pub fn format_contexts(&self, contexts: &[ContextRecord]) -> String {
        if contexts.is_empty() {
            return NO_CONTEXT_TEXT.to_string();
        }
        contexts
            .iter()
            .enumerate()
            .map(|(i, ctx)| {
                format!(
                    "---\n[Nguồn {rank}] {name} - {article}\nĐộ liên quan: {score:.2}\n\n{text}\n---",
                    rank = i + 1,
                    name = ctx.document_name,
                    article = article_ref(ctx),
                    score = ctx.relevance(),
                    text = truncate_chars(&ctx.text, CONTEXT_TEXT_CHARS),
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn rag_prompt(&self, query: &str, contexts: &[ContextRecord]) -> String {
        format!(
            "{system}\n\n[CONTEXT DATA - KHÔNG ĐƯỢC BỊA ĐẶT]\n\
             Dưới đây là các trích dẫn chính xác từ Quy chuẩn/Tiêu chuẩn (được xếp hạng theo độ liên quan):\n\n\
             {contexts}\n\n[USER QUERY]\nCâu hỏi: \"{query}\"\n\n[ANSWER]\n",
            system = self.system_instruction,
            contexts = self.format_contexts(contexts),
        )
    }

    /// Recent history followed by the grounded prompt as the final user turn.
    pub fn messages(&self, query: &str, contexts: &[ContextRecord], history: &[Message]) -> Vec<Message> {
        let turns: Vec<&Message> = history.iter().filter(|m| m.role != Role::System).collect();
        let recent = &turns[turns.len().saturating_sub(HISTORY_TURNS)..];

        let mut messages: Vec<Message> = recent.iter().map(|m| (*m).clone()).collect();
        messages.push(Message::user(self.rag_prompt(query, contexts)));
        messages
    }

    pub fn judge_prompt(&self, answer: &str, contexts: &[ContextRecord]) -> String {
        let ctx = contexts
            .iter()
            .take(JUDGE_CONTEXTS)
            .enumerate()
            .map(|(i, c)| format!("[{}] {}", i + 1, truncate_chars(&c.text, JUDGE_CONTEXT_CHARS)))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Bạn là thẩm phán đánh giá tính chính xác.\n\n\
             Ngữ cảnh:\n{ctx}\n\n\
             Câu trả lời:\n{answer}\n\n\
             Câu trả lời có được hỗ trợ hoàn toàn bởi ngữ cảnh không?\n\
             Trả lời: SUPPORTED hoặc NOT_SUPPORTED",
            answer = truncate_chars(answer, JUDGE_ANSWER_CHARS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(text: &str, article: Option<&str>, clause: Option<&str>, score: f64) -> ContextRecord {
        ContextRecord {
            id: "c".into(),
            text: text.into(),
            document_name: "QCVN 06:2022/BXD".into(),
            document_id: "qcvn_06_2022_bxd".into(),
            page_number: 12,
            chapter: None,
            article: article.map(String::from),
            clause: clause.map(String::from),
            full_context: None,
            bbox: None,
            retrieval_score: score,
            rerank_score: None,
        }
    }

    #[test]
    fn formats_numbered_sources() {
        let mut reranked = context("Hành lang rộng tối thiểu 1,4 m.", Some("3"), Some("2"), 0.03);
        reranked.rerank_score = Some(0.9871);
        let plain = context("Nhà nhóm F1.", None, None, 0.016);

        let text = PromptBuilder::new().format_contexts(&[reranked, plain]);
        assert_eq!(
            text,
            "---\n[Nguồn 1] QCVN 06:2022/BXD - Điều 3, Khoản 2\nĐộ liên quan: 0.99\n\n\
             Hành lang rộng tối thiểu 1,4 m.\n---\n\n\
             ---\n[Nguồn 2] QCVN 06:2022/BXD - N/A\nĐộ liên quan: 0.02\n\nNhà nhóm F1.\n---"
        );
    }

    #[test]
    fn empty_contexts_use_placeholder() {
        let prompt = PromptBuilder::new().rag_prompt("Câu hỏi?", &[]);
        assert!(prompt.contains(NO_CONTEXT_TEXT));
        assert!(prompt.starts_with("[ROLE DEFINITION]"));
        assert!(prompt.ends_with("Câu hỏi: \"Câu hỏi?\"\n\n[ANSWER]\n"));
    }

    #[test]
    fn long_context_text_is_truncated() {
        let long = "â".repeat(CONTEXT_TEXT_CHARS + 50);
        let text = PromptBuilder::new().format_contexts(&[context(&long, None, None, 1.0)]);
        assert!(text.contains(&"â".repeat(CONTEXT_TEXT_CHARS)));
        assert!(!text.contains(&"â".repeat(CONTEXT_TEXT_CHARS + 1)));
    }

    #[test]
    fn keeps_only_recent_history() {
        let history: Vec<Message> = (0..8)
            .map(|i| if i % 2 == 0 { Message::user(format!("q{i}")) } else { Message::assistant(format!("a{i}")) })
            .chain(std::iter::once(Message::system("ignored")))
            .collect();

        let messages = PromptBuilder::new().messages("mới", &[], &history);
        assert_eq!(messages.len(), HISTORY_TURNS + 1);
        assert_eq!(messages[0].content, "a3");
        assert_eq!(messages[4].content, "a7");
        assert_eq!(messages[5].role, Role::User);
        assert!(messages[5].content.contains("Câu hỏi: \"mới\""));
    }

    #[test]
    fn judge_prompt_limits_contexts() {
        let contexts: Vec<ContextRecord> =
            (0..7).map(|i| context(&format!("đoạn {i}"), None, None, 0.1)).collect();
        let prompt = PromptBuilder::new().judge_prompt("Có.", &contexts);

        assert!(prompt.contains("[5] đoạn 4"));
        assert!(!prompt.contains("[6]"));
        assert!(prompt.contains("Câu trả lời:\nCó.\n"));
        assert!(prompt.ends_with("SUPPORTED hoặc NOT_SUPPORTED"));
    }
}
