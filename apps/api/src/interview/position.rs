//! The eight interview tracks and the per-track material the prompts draw on.

use serde::{Deserialize, Serialize};

/// Interview track. Serialized with the Chinese labels the browser uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionType {
    #[serde(rename = "前端")]
    Frontend,
    #[serde(rename = "后端")]
    Backend,
    #[serde(rename = "算法")]
    Algorithm,
    #[serde(rename = "产品")]
    Product,
    #[serde(rename = "测试")]
    Testing,
    #[serde(rename = "运营")]
    Operations,
    #[serde(rename = "数据")]
    Data,
    #[serde(rename = "DevOps")]
    DevOps,
}

/// Expertise, focus areas and tech stack the interviewer persona claims.
#[derive(Debug, Clone, Copy)]
pub struct PositionProfile {
    pub expertise: &'static str,
    /// Separated by `、`.
    pub focus: &'static str,
    pub tech_stack: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct DesignScenario {
    pub scenario: &'static str,
    pub description: &'static str,
}

/// Keyword lists for classifying a free-form job title, checked in order.
const TITLE_KEYWORDS: [(PositionType, &[&str]); 8] = [
    (
        PositionType::Frontend,
        &["前端", "frontend", "react", "vue", "angular", "web开发", "ui开发", "h5开发"],
    ),
    (
        PositionType::Backend,
        &["后端", "backend", "java", "python", "node", "golang", "php", "c++", "服务端", "server"],
    ),
    (
        PositionType::Algorithm,
        &["算法", "机器学习", "深度学习", "人工智能", "nlp", "推荐系统", "计算机视觉", "ai"],
    ),
    (
        PositionType::Product,
        &["产品", "product", "pm", "用户体验", "ux"],
    ),
    (
        PositionType::Testing,
        &["测试", "test", "qa", "质量"],
    ),
    (
        PositionType::Operations,
        &["运营", "operation", "市场", "营销", "增长"],
    ),
    (
        PositionType::Data,
        &["数据", "data", "分析师", "bi", "大数据", "数仓", "etl", "hadoop", "spark"],
    ),
    (
        PositionType::DevOps,
        &["devops", "运维", "sre", "docker", "kubernetes", "k8s", "云原生", "基础设施", "部署", "cicd"],
    ),
];

impl PositionType {
    pub const ALL: [PositionType; 8] = [
        PositionType::Frontend,
        PositionType::Backend,
        PositionType::Algorithm,
        PositionType::Product,
        PositionType::Testing,
        PositionType::Operations,
        PositionType::Data,
        PositionType::DevOps,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PositionType::Frontend => "前端",
            PositionType::Backend => "后端",
            PositionType::Algorithm => "算法",
            PositionType::Product => "产品",
            PositionType::Testing => "测试",
            PositionType::Operations => "运营",
            PositionType::Data => "数据",
            PositionType::DevOps => "DevOps",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL.into_iter().find(|p| p.label() == label)
    }

    /// Best-effort classification of a job title. Falls back to `Frontend`.
    pub fn from_job_title(title: &str) -> Self {
        let title = title.to_lowercase();
        TITLE_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| title.contains(k)))
            .map(|(position, _)| *position)
            .unwrap_or(PositionType::Frontend)
    }

    pub fn profile(self) -> PositionProfile {
        match self {
            PositionType::Frontend => PositionProfile {
                expertise: "前端开发、用户体验、性能优化、现代前端框架(React/Vue/Angular)、工程化建设",
                focus: "页面性能优化、组件设计、状态管理、浏览器兼容性、用户交互体验",
                tech_stack: "JavaScript/TypeScript、CSS、HTML、React/Vue、Webpack/Vite、Node.js",
            },
            PositionType::Backend => PositionProfile {
                expertise: "后端架构设计、分布式系统、数据库设计、微服务、高并发处理",
                focus: "系统架构、数据库优化、API设计、缓存策略、服务治理、性能调优",
                tech_stack: "Java/Python/Go、Spring/Django/Gin、MySQL/Redis、消息队列、Docker/K8s",
            },
            PositionType::Algorithm => PositionProfile {
                expertise: "机器学习、深度学习、推荐系统、数据挖掘、算法优化",
                focus: "模型设计、特征工程、算法复杂度、数据处理、模型优化、业务落地",
                tech_stack: "Python/R、TensorFlow/PyTorch、Spark、Hadoop、数据分析工具",
            },
            PositionType::Product => PositionProfile {
                expertise: "产品设计、用户研究、数据分析、业务理解、项目管理",
                focus: "用户需求分析、产品规划、数据驱动决策、竞品分析、用户体验设计",
                tech_stack: "原型设计工具、数据分析工具、项目管理工具、用户研究方法",
            },
            PositionType::Testing => PositionProfile {
                expertise: "自动化测试、性能测试、测试框架设计、质量保障、测试策略",
                focus: "测试用例设计、自动化覆盖、性能瓶颈、质量指标、测试效率",
                tech_stack: "Selenium、JMeter、Jest/Mocha、CI/CD、测试管理工具",
            },
            PositionType::Operations => PositionProfile {
                expertise: "用户增长、数据分析、内容运营、活动策划、渠道管理",
                focus: "用户获取、留存提升、转化优化、数据洞察、运营策略",
                tech_stack: "数据分析工具、用户行为分析、A/B测试、CRM系统",
            },
            PositionType::Data => PositionProfile {
                expertise: "大数据处理、数据仓库、ETL开发、数据分析、商业智能",
                focus: "数据建模、ETL流程、数据质量、实时计算、数据可视化",
                tech_stack: "Spark、Hadoop、Hive、Kafka、Flink、ClickHouse、Tableau",
            },
            PositionType::DevOps => PositionProfile {
                expertise: "CI/CD建设、容器化部署、云原生架构、监控运维、自动化工具",
                focus: "部署自动化、监控告警、容器编排、云服务架构、运维效率",
                tech_stack: "Docker、Kubernetes、Jenkins、Prometheus、Terraform、云服务",
            },
        }
    }

    /// Seed questions the interviewer may adapt.
    pub fn reference_questions(self) -> [&'static str; 3] {
        match self {
            PositionType::Frontend => [
                "请介绍一下你最近做过的一个前端项目，重点说说你是如何优化页面性能的？",
                "在React/Vue项目中，你是如何处理状态管理的？遇到过什么复杂场景？",
                "能说说你对前端工程化的理解吗？你们团队是如何做构建优化的？",
            ],
            PositionType::Backend => [
                "请介绍一个你参与的高并发系统，说说你是如何设计和优化的？",
                "在分布式系统中，你是如何保证数据一致性的？能举个具体例子吗？",
                "谈谈你对微服务架构的理解，以及在实际项目中遇到的挑战？",
            ],
            PositionType::Algorithm => [
                "请介绍一个你做过的机器学习项目，重点说说模型选择和优化过程？",
                "在推荐系统中，你是如何处理冷启动问题的？",
                "能说说你对特征工程的理解吗？在实际项目中是如何做特征选择的？",
            ],
            PositionType::Product => [
                "请介绍一个你主导的产品项目，说说你是如何进行需求分析和产品设计的？",
                "在产品迭代过程中，你是如何平衡用户需求和技术实现的？",
                "能说说你是如何做数据分析和用户研究的？有什么具体的方法论？",
            ],
            PositionType::Testing => [
                "请介绍一下你们团队的测试体系，你是如何设计自动化测试的？",
                "在微服务架构下，你是如何做集成测试和端到端测试的？",
                "能说说你对测试左移的理解吗？在实际项目中是如何实践的？",
            ],
            PositionType::Operations => [
                "请介绍一个你做过的运营活动，说说你是如何设计和执行的？",
                "在用户增长方面，你有什么经验和方法论？",
                "能说说你是如何做数据分析和运营决策的？",
            ],
            PositionType::Data => [
                "请介绍一个你做过的数据分析项目，说说你的分析思路和方法？",
                "在大数据处理方面，你使用过哪些技术栈？遇到过什么挑战？",
                "能说说你对数据仓库和数据湖的理解吗？",
            ],
            PositionType::DevOps => [
                "请介绍一下你们团队的CI/CD流程，你是如何设计和优化的？",
                "在容器化和微服务部署方面，你有什么经验？",
                "能说说你是如何做监控和运维的？遇到过什么棘手的问题？",
            ],
        }
    }

    pub fn design_scenario(self) -> DesignScenario {
        match self {
            PositionType::Frontend => DesignScenario {
                scenario: "设计一个支持百万用户的在线协作文档系统前端架构",
                description: "需要支持实时协作编辑、版本控制、权限管理等功能。请考虑前端架构设计、状态管理、性能优化、离线支持等方面。",
            },
            PositionType::Backend => DesignScenario {
                scenario: "设计一个日活千万的社交媒体平台后端系统",
                description: "需要支持用户发布动态、关注关系、消息推送、内容推荐等功能。请考虑系统架构、数据库设计、缓存策略、消息队列等方面。",
            },
            PositionType::Algorithm => DesignScenario {
                scenario: "设计一个电商平台的个性化推荐系统",
                description: "需要为用户推荐商品，考虑用户行为、商品特征、实时性要求等。请设计推荐算法、特征工程、模型训练和在线服务架构。",
            },
            PositionType::Product => DesignScenario {
                scenario: "设计一个面向年轻人的短视频社交产品",
                description: "目标用户是18-25岁的年轻人，需要考虑用户需求、产品功能、商业模式、竞争分析等。请设计产品架构和核心功能。",
            },
            PositionType::Testing => DesignScenario {
                scenario: "设计一个微服务架构的全链路测试体系",
                description: "需要为复杂的微服务系统设计完整的测试方案，包括单元测试、集成测试、端到端测试、性能测试等。请考虑测试策略、自动化方案、质量保障等方面。",
            },
            PositionType::Operations => DesignScenario {
                scenario: "设计一个电商平台的用户增长运营体系",
                description: "需要从0到1搭建用户增长体系，包括用户获取、激活、留存、推荐等环节。请考虑运营策略、数据分析、用户分层、活动设计等方面。",
            },
            PositionType::Data => DesignScenario {
                scenario: "设计一个实时数据分析平台",
                description: "需要支持海量数据的实时采集、处理、分析和可视化。请考虑数据架构、存储方案、计算引擎、监控告警等方面。",
            },
            PositionType::DevOps => DesignScenario {
                scenario: "设计一个支持多云部署的CI/CD平台",
                description: "需要支持多个云平台的自动化部署，包括代码管理、构建、测试、部署、监控等全流程。请考虑平台架构、工具链选择、安全性、可扩展性等方面。",
            },
        }
    }
}

/// Dimensions scored in the closing summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvaluationDimension {
    #[serde(rename = "技术深度")]
    TechnicalDepth,
    #[serde(rename = "业务理解")]
    BusinessUnderstanding,
    #[serde(rename = "系统设计")]
    SystemDesign,
    #[serde(rename = "问题解决")]
    ProblemSolving,
    #[serde(rename = "沟通协作")]
    Communication,
}

impl EvaluationDimension {
    /// The dimensions used when the caller does not choose.
    pub const SUMMARY_DEFAULT: [EvaluationDimension; 4] = [
        EvaluationDimension::TechnicalDepth,
        EvaluationDimension::ProblemSolving,
        EvaluationDimension::SystemDesign,
        EvaluationDimension::Communication,
    ];

    pub fn label(self) -> &'static str {
        match self {
            EvaluationDimension::TechnicalDepth => "技术深度",
            EvaluationDimension::BusinessUnderstanding => "业务理解",
            EvaluationDimension::SystemDesign => "系统设计",
            EvaluationDimension::ProblemSolving => "问题解决",
            EvaluationDimension::Communication => "沟通协作",
        }
    }
}
