// Interview prompt templates and the pure functions that fill them.
// No I/O here: every function maps structured input to prompt text.

use crate::interview::models::{ConversationMessage, ExtractionRequest, Role};
use crate::interview::position::{EvaluationDimension, PositionType};
use crate::llm_client::prompts::{join_cn, numbered, render, JSON_ONLY_INSTRUCTION};

/// Skill gaps raised per turn.
const MAX_GAP_FOCUS: usize = 2;
/// Reference questions offered per turn.
const MAX_REFERENCE_QUESTIONS: usize = 2;

pub const OPENING_TEMPLATE: &str = "你是一位资深的{position}技术面试官，有8年以上相关经验。{candidate_line}

请生成简洁的开场白：
1. 简单自我介绍（一句话）
2. 只问1个核心问题：请候选人简单介绍自己的工作经历

要求：
- 语气自然，不要刻意安慰或提醒
- 直接进入主题，不要多余的客套话
- 只问工作经历这一个问题

开始面试吧！";

pub const EXTRACTION_TEMPLATE: &str = r#"分析以下信息，提取面试关键参数：

职位：{job_title}
JD：{job_description}
公司：{company}
简历：{resume}

请提取并输出JSON：
{
  "positionType": "前端|后端|算法|产品|测试|运营|数据|DevOps",
  "projectKeywords": ["项目关键词1", "项目关键词2", "项目关键词3"],
  "skillGaps": ["技能差距1", "技能差距2"]
}

要求：
1. positionType 必须从8个选项中选择
2. projectKeywords 提取简历中3个核心项目/技术
3. skillGaps 识别JD要求但简历缺少的2个技能

{json_only}"#;

pub const INTERVIEWER_SYSTEM_TEMPLATE: &str = "你是一位资深的{position}技术面试官，拥有丰富的面试经验和深厚的技术背景。你的任务是进行专业、深入且友善的技术面试。

**你的专业背景：**
- 拥有8年以上{position}开发和团队管理经验
- 专业领域：{expertise}
- 熟悉技术栈：{tech_stack}
- 善于通过循序渐进的提问深入了解候选人的技术能力
- 面试风格专业、友善、有条理

**{position}面试重点关注：**
{focus_list}

**面试核心原则：**
1. **渐进式提问**：从基础概念开始，根据候选人回答深度逐步深入
2. **情境化考查**：将理论知识与实际{position}项目场景相结合
3. **思维过程重视**：关注候选人的思考逻辑，而不仅仅是标准答案
4. **适度引导**：当候选人思路不清时，给予适当提示和引导
5. **检索内容优先**：优先使用提供的相关题目和参考内容进行提问
6. **智能话题转换**：当候选人表示不了解某技术时，立即转向其熟悉领域，避免重复提问

**提问策略：**
- 每次提问控制在1-2个问题，给候选人充分思考时间
- 基于候选人的{position}项目经验设计具体场景问题
- 通过\"为什么\"、\"如何实现\"、\"有什么替代方案\"等追问深入
- 遇到候选人不熟悉的技术时，立即切换到其擅长的技术栈或项目经历

**沟通要求：**
- 使用{position}领域的专业术语，但确保候选人能够理解
- 保持耐心和鼓励的态度，适时给予正面反馈
- 控制面试节奏，确保深度和效率的平衡

请严格按照提供的面试指导进行提问，作为{position}面试官，请重点关注该领域的核心技术能力。";

pub const TECHNICAL_QUESTION_TEMPLATE: &str = "你是资深{position}技术面试官。基于对话上下文进行有针对性的提问。

**候选人背景：** {keywords}
**评估重点：** {gaps}{retrieval}
{history}
**核心原则：**
1. **禁止重复提问** - 不问已回答过的问题
2. **智能追问** - 基于候选人回答的技术点深入挖掘
3. **简洁提问** - 每次最多2个问题
4. **灵活应对** - 根据回答类型调整策略

**应对策略：**
- 技术回答详细 → 深入追问实现细节、设计考虑
- 技术回答简单 → 基于已提到技术点继续挖掘
- 表示不了解 → 立即转向熟悉技术或项目经历
- 自我介绍 → 从工作经历或项目开始提问

**参考方向：**
{reference_questions}

请提出1个合适的面试问题。";

pub const PROJECT_EXPERIENCE_TEMPLATE: &str = "**当前面试阶段：** 项目经验深度挖掘

**候选人项目亮点：**
{highlights}

**深挖策略：**
1. 选择1-2个最有价值的项目进行深入了解
2. 重点关注候选人在项目中的具体贡献和作用
3. 了解项目遇到的核心技术难题及解决方案
4. 评估候选人的学习能力和成长轨迹

**核心提问思路：**
- \"能详细介绍一下你在这个项目中的具体职责吗？\"
- \"项目过程中遇到的最大技术挑战是什么？你是如何解决的？\"
- \"如果让你重新设计这个项目，你会有什么不同的考虑？\"

请开始项目经验提问。";

pub const SYSTEM_DESIGN_TEMPLATE: &str = "**当前面试阶段：** 系统设计（候选人级别：{level}）

**设计场景：** {scenario}

**评估维度：**
- 需求理解和澄清能力
- 架构设计的合理性
- 技术选型的权衡思考
- 扩展性和可维护性考虑

**面试官指导原则：**
1. 让候选人先澄清需求，不要急于给出方案
2. 鼓励候选人画图或用文字描述架构
3. 适时提出约束条件（如并发量、数据规模等）
4. 关注候选人如何处理权衡和妥协

**场景描述：**
{description}

请开始系统设计面试。";

pub const SUMMARY_TEMPLATE: &str = "**当前面试阶段：** 面试总结

**评估维度：**
{dimension_list}

**总结任务：**
1. 简要回顾面试过程中的关键问题和候选人表现
2. 针对每个评估维度给出客观评价（1-5分）
3. 指出候选人的优势和待改进点
4. 给出具体的学习建议和发展方向

**输出格式：**
## 面试总结

### 整体表现
[简要描述候选人的整体表现]

### 各维度评分
{dimension_scores}

### 优势亮点
- [列出2-3个主要优势]

### 改进建议
- [列出2-3个具体的改进方向]

请开始面试总结。";

pub fn opening_prompt(position: PositionType, candidate_name: Option<&str>) -> String {
    let candidate_line = candidate_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(|n| format!("候选人称呼：{n}。"))
        .unwrap_or_default();
    render(
        OPENING_TEMPLATE,
        &[("position", position.label()), ("candidate_line", &candidate_line)],
    )
}

pub fn extraction_prompt(request: &ExtractionRequest) -> String {
    let company = match (
        request.company_name.as_deref().unwrap_or("").trim(),
        request.company_description.as_deref().unwrap_or("").trim(),
    ) {
        ("", "") => "未提供".to_string(),
        (name, "") => name.to_string(),
        ("", description) => description.to_string(),
        (name, description) => format!("{name} - {description}"),
    };
    render(
        EXTRACTION_TEMPLATE,
        &[
            ("job_title", request.job_title.trim()),
            ("job_description", request.job_description.trim()),
            ("company", &company),
            ("resume", request.resume.trim()),
            ("json_only", JSON_ONLY_INSTRUCTION),
        ],
    )
}

pub fn interviewer_system_prompt(position: PositionType) -> String {
    let profile = position.profile();
    let focus_list = profile
        .focus
        .split('、')
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n");
    render(
        INTERVIEWER_SYSTEM_TEMPLATE,
        &[
            ("position", position.label()),
            ("expertise", profile.expertise),
            ("tech_stack", profile.tech_stack),
            ("focus_list", &focus_list),
        ],
    )
}

pub fn technical_question_prompt(
    position: PositionType,
    project_keywords: &[String],
    skill_gaps: &[String],
    retrieval_context: &str,
    history: &[ConversationMessage],
) -> String {
    let gaps = &skill_gaps[..skill_gaps.len().min(MAX_GAP_FOCUS)];

    let retrieval = if retrieval_context.trim().is_empty() {
        String::new()
    } else {
        format!(
            "\n**检索内容：** {}\n**策略：** 优先使用检索题目，结合候选人项目经验提问。",
            retrieval_context.trim()
        )
    };

    let history_block = if history.is_empty() {
        String::new()
    } else {
        let lines = history
            .iter()
            .map(|m| {
                let speaker = match m.role {
                    Role::Interviewer => "面试官",
                    Role::Candidate => "候选人",
                };
                format!("{speaker}: {}", m.content)
            })
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "\n**对话历史：**\n{lines}\n\n**重要：基于对话历史，绝不重复已问过的问题，必须深入追问候选人提到的技术点。**\n"
        )
    };

    let questions = position.reference_questions();
    let reference_questions = numbered(&questions[..MAX_REFERENCE_QUESTIONS]);

    render(
        TECHNICAL_QUESTION_TEMPLATE,
        &[
            ("position", position.label()),
            ("keywords", &join_cn(project_keywords)),
            ("gaps", &join_cn(gaps)),
            ("retrieval", &retrieval),
            ("history", &history_block),
            ("reference_questions", &reference_questions),
        ],
    )
}

pub fn project_experience_prompt(highlights: &[String]) -> String {
    render(
        PROJECT_EXPERIENCE_TEMPLATE,
        &[("highlights", &numbered(highlights))],
    )
}

pub fn system_design_prompt(position: PositionType, level: &str) -> String {
    let scenario = position.design_scenario();
    render(
        SYSTEM_DESIGN_TEMPLATE,
        &[
            ("level", level),
            ("scenario", scenario.scenario),
            ("description", scenario.description),
        ],
    )
}

pub fn summary_prompt(dimensions: &[EvaluationDimension]) -> String {
    let dimension_list = dimensions
        .iter()
        .map(|d| format!("- {}", d.label()))
        .collect::<Vec<_>>()
        .join("\n");
    let dimension_scores = dimensions
        .iter()
        .map(|d| format!("**{}：** X/5分 - [具体评价]", d.label()))
        .collect::<Vec<_>>()
        .join("\n");
    render(
        SUMMARY_TEMPLATE,
        &[
            ("dimension_list", &dimension_list),
            ("dimension_scores", &dimension_scores),
        ],
    )
}
