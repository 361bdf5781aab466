//! Prompt text for case analysis and law summaries.

use fairtrade_ai::Prompt;
use fairtrade_core::{LawRecord, RetrievalResult};

/// Section headings the analysis prompt asks for, in order.
pub const SECTION_HEADINGS: [&str; 3] = ["적용 법령", "위반 가능성 평가", "권고 사항"];

pub const NO_CONTEXT_NARRATIVE: &str = "제공된 법령 자료에서 이 케이스와 관련된 조항을 찾지 못했습니다. \
법령 데이터를 수집한 뒤 인덱스를 다시 구축하거나, 케이스 설명을 더 구체적으로 작성해 주세요.";

pub const NO_ARTICLES_NOTE: &str = "수집된 조문이 없어 요약할 내용이 없습니다.";

const ANALYSIS_SYSTEM: &str = "당신은 대한민국 공정거래 관련 법령을 다루는 법률 분석 보조자입니다. \
반드시 사용자가 제공한 법령 조문만 근거로 답변하고, 제공되지 않은 법령이나 조문은 인용하지 마십시오. \
근거가 부족하면 부족하다고 밝히십시오. 답변은 한국어로 작성합니다.";

const SUMMARY_SYSTEM: &str = "당신은 대한민국 공정거래 관련 법령을 요약하는 법률 전문가입니다. \
제공된 조문에 있는 내용만 요약하고, 한국어로 간결하게 작성합니다.";

/// Grounded analysis prompt: numbered passages, then the case, then the task.
pub fn analysis_prompt(case_description: &str, context: &[RetrievalResult]) -> Prompt {
    let mut user = String::from("## 관련 법령 조문\n\n");
    for (i, hit) in context.iter().enumerate() {
        user.push_str(&format!(
            "[{}] {}\n{}\n\n",
            i + 1,
            hit.unit.citation(),
            hit.unit.text.trim()
        ));
    }

    user.push_str("## 케이스\n\n");
    user.push_str(case_description.trim());
    user.push_str("\n\n## 요청\n\n위 조문만을 근거로 다음 세 항목을 작성하십시오.\n");
    user.push_str(&format!(
        "### {}\n이 케이스에 적용될 수 있는 법령과 조문을 위 번호와 함께 제시하십시오.\n",
        SECTION_HEADINGS[0]
    ));
    user.push_str(&format!(
        "### {}\n각 조문에 비추어 위반 가능성을 평가하고 그 이유를 설명하십시오.\n",
        SECTION_HEADINGS[1]
    ));
    user.push_str(&format!(
        "### {}\n당사자가 취할 수 있는 대응 방안을 제시하십시오.\n",
        SECTION_HEADINGS[2]
    ));
    user.push_str("\n위 목록에 없는 법령이나 조문은 인용하지 마십시오.");

    Prompt::new(ANALYSIS_SYSTEM, user)
}

/// Summary prompt for one part of a law's articles.
pub fn summary_prompt(law: &LawRecord, articles: &str, part: usize, parts: usize) -> Prompt {
    let scope = if parts > 1 {
        format!(" ({part}/{parts} 부분)")
    } else {
        String::new()
    };
    let user = format!(
        "다음은 「{}」의 조문입니다{scope}.\n\n{articles}\n\n\
         이 법령의 목적, 주요 규제 내용, 위반 시 제재를 중심으로 요약하십시오.",
        law.title
    );
    Prompt::new(SUMMARY_SYSTEM, user)
}
