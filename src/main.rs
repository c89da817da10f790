use std::io::Write;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use serde::Serialize;

use dragon_faith::commands::{ai_cmd, analysis_cmd, record_cmd, settings_cmd};
use dragon_faith::models::ai::{AIConfig, AIStreamEvent};
use dragon_faith::models::record::SentimentRecord;
use dragon_faith::models::settings::ScoreMode;
use dragon_faith::services::ai_task::AiOutcome;
use dragon_faith::AppState;

#[derive(Parser)]
#[command(name = "dragon-faith", version, about = "龙头信仰：A股短线情绪复盘")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 数据目录（默认为系统数据目录下的 dragon-faith）
    #[arg(long, global = true, env = "DRAGON_FAITH_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// 情绪记录
    Record {
        #[command(subcommand)]
        action: RecordAction,
    },
    /// 近期持续性板块
    Sectors,
    /// 试算工作记录的分数和阶段
    Classify,
    /// 附件队列
    Attach {
        #[command(subcommand)]
        action: AttachAction,
    },
    /// AI 提取与复盘
    Ai {
        #[command(subcommand)]
        action: AiAction,
    },
    /// 设置
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum RecordAction {
    /// 新建空白记录（默认当前交易日）
    New {
        #[arg(long)]
        date: Option<String>,
    },
    /// 载入历史记录作为工作副本
    Load { date: String },
    /// 显示工作副本
    Show,
    /// 修改工作副本
    Edit {
        /// 用 JSON 文件整体替换
        #[arg(long, conflicts_with = "patch")]
        file: Option<PathBuf>,
        /// 部分修改，格式同 AI 提取结果，如 '{"sentiment":{"limit_up_count":66}}'
        #[arg(long)]
        patch: Option<String>,
    },
    /// 保存工作副本（同日覆盖）
    Save,
    /// 列出已存记录
    List {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// 查看某日记录
    Get { date: String },
    /// 导出全部记录到 JSON 文件
    Export { path: PathBuf },
    /// 从 JSON 文件导入记录
    Import { path: PathBuf },
    /// 手动打分（0~100）
    Score { score: i64 },
}

#[derive(Subcommand)]
enum AttachAction {
    /// 添加截图或复盘文件
    Add { paths: Vec<PathBuf> },
    List,
    Clear,
}

#[derive(Subcommand)]
enum AiAction {
    /// 从附件提取盘面数据
    Extract,
    /// 流式复盘点评
    Analyze,
    /// 复盘历史
    History {
        /// 记录日期，默认工作副本的日期
        #[arg(long)]
        date: Option<String>,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// 今日 token 用量
    Usage,
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    /// 添加模型配置
    AddAi {
        #[arg(long)]
        name: String,
        #[arg(long)]
        base_url: String,
        #[arg(long, env = "DRAGON_FAITH_API_KEY", hide_env_values = true)]
        api_key: String,
        #[arg(long)]
        model: String,
        #[arg(long, default_value_t = 2048)]
        max_tokens: u32,
        #[arg(long, default_value_t = 0.3)]
        temperature: f64,
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,
        #[arg(long, default_value_t = 0)]
        max_retries: u32,
    },
    RemoveAi { id: String },
    UseAi { id: String },
    /// 测试模型配置（默认当前启用的）
    TestAi { id: Option<String> },
    SetScoreMode { mode: ScoreModeArg },
    SetStoreKey { key: String },
    /// 附件队列上限
    SetMaxAttachments { max: usize },
}

#[derive(Clone, Copy, ValueEnum)]
enum ScoreModeArg {
    Derived,
    Manual,
}

impl From<ScoreModeArg> for ScoreMode {
    fn from(arg: ScoreModeArg) -> Self {
        match arg {
            ScoreModeArg::Derived => ScoreMode::Derived,
            ScoreModeArg::Manual => ScoreMode::Manual,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

fn print_outcome<T: Serialize>(outcome: AiOutcome<T>) -> Result<(), String> {
    match outcome {
        AiOutcome::Succeeded(summary) => print_json(&summary),
        AiOutcome::Failed(reason) => Err(format!("AI 请求失败: {}", reason)),
    }
}

fn summary_line(r: &SentimentRecord) -> String {
    format!(
        "{}  {:>3}分 {}  涨停{} 跌停{} 炸板{:.1}%  龙头:{}",
        r.date,
        r.score,
        r.stage.label(),
        r.limit_up_count,
        r.limit_down_count,
        r.broken_rate,
        if r.dragon.is_empty() { "-" } else { r.dragon.as_str() }
    )
}

async fn run_record(state: &AppState, action: RecordAction) -> Result<(), String> {
    match action {
        RecordAction::New { date } => {
            let r = record_cmd::new_record(state, date).await?;
            println!("新建 {} 的记录", r.date);
        }
        RecordAction::Load { date } => {
            let r = record_cmd::load_record(state, date).await?;
            println!("已载入 {}", summary_line(&r));
        }
        RecordAction::Show => print_json(&record_cmd::get_working_record(state).await?)?,
        RecordAction::Edit { file, patch } => match (file, patch) {
            (Some(path), _) => {
                let data = std::fs::read_to_string(&path)
                    .map_err(|e| format!("读取 {} 失败: {}", path.display(), e))?;
                let record: SentimentRecord =
                    serde_json::from_str(&data).map_err(|e| e.to_string())?;
                let r = record_cmd::replace_working_record(state, record).await?;
                println!("已替换工作副本 {}", r.date);
            }
            (None, Some(patch)) => {
                let value: serde_json::Value =
                    serde_json::from_str(&patch).map_err(|e| e.to_string())?;
                let changed = record_cmd::patch_working_record(state, value).await?;
                println!("更新 {} 个字段", changed);
            }
            (None, None) => return Err("需要 --file 或 --patch".to_string()),
        },
        RecordAction::Save => {
            let s = record_cmd::save_record(state).await?;
            println!("已保存 {}：{}分 {}，共 {} 条", s.date, s.score, s.stage.label(), s.total);
        }
        RecordAction::List { limit } => {
            let records = record_cmd::list_records(state, limit).await?;
            if records.is_empty() {
                println!("暂无记录");
            }
            for r in &records {
                println!("{}", summary_line(r));
            }
        }
        RecordAction::Get { date } => match record_cmd::get_record(state, date.clone()).await? {
            Some(r) => print_json(&r)?,
            None => return Err(format!("没有 {} 的记录", date)),
        },
        RecordAction::Export { path } => {
            let n = record_cmd::export_records(state, path.clone()).await?;
            println!("已导出 {} 条到 {}", n, path.display());
        }
        RecordAction::Import { path } => {
            let n = record_cmd::import_records(state, path).await?;
            println!("已导入 {} 条", n);
        }
        RecordAction::Score { score } => {
            let r = record_cmd::set_manual_score(state, score).await?;
            println!("{}分 {}", r.score, r.stage.label());
        }
    }
    Ok(())
}

async fn run_ai(state: &AppState, action: AiAction) -> Result<(), String> {
    match action {
        AiAction::Extract => print_outcome(ai_cmd::ai_extract_market_data(state).await?)?,
        AiAction::Analyze => {
            let (tx, mut rx) = tokio::sync::mpsc::channel::<AIStreamEvent>(100);
            let printer = tokio::spawn(async move {
                let mut stdout = std::io::stdout();
                while let Some(event) = rx.recv().await {
                    if let Some(text) = event.content {
                        let _ = write!(stdout, "{}", text);
                        let _ = stdout.flush();
                    }
                    if event.done {
                        let _ = writeln!(stdout);
                    }
                }
            });

            let outcome = ai_cmd::ai_analyze_working_record(state, tx).await?;
            let _ = printer.await;
            match outcome {
                AiOutcome::Succeeded(s) => {
                    let stage = s.stage.map(|st| st.label()).unwrap_or("未给出");
                    println!(
                        "\n[{}] 阶段标签：{}，数据修正 {} 项，消耗 {} tokens",
                        s.record_date, stage, s.changed_fields, s.total_tokens
                    );
                }
                AiOutcome::Failed(reason) => return Err(format!("AI 请求失败: {}", reason)),
            }
        }
        AiAction::History { date, limit } => {
            let date = match date {
                Some(d) => d,
                None => record_cmd::get_working_record(state).await?.date,
            };
            let history = ai_cmd::get_analysis_history(state, date, limit).await?;
            for h in &history {
                println!("── {} {} ({})\n{}\n", h.created_at, h.question, h.model_name, h.content);
            }
        }
        AiAction::Usage => println!("今日已用 {} tokens", ai_cmd::get_today_token_usage(state).await?),
    }
    Ok(())
}

async fn run_config(state: &AppState, action: ConfigAction) -> Result<(), String> {
    match action {
        ConfigAction::Show => {
            let mut settings = settings_cmd::get_settings(state).await?;
            for c in settings.ai_configs.iter_mut() {
                if !c.api_key.is_empty() {
                    c.api_key = "******".to_string();
                }
            }
            print_json(&settings)?;
        }
        ConfigAction::AddAi {
            name,
            base_url,
            api_key,
            model,
            max_tokens,
            temperature,
            timeout_secs,
            max_retries,
        } => {
            let config = AIConfig {
                name,
                base_url,
                api_key,
                model_name: model,
                max_tokens,
                temperature,
                timeout_secs,
                max_retries,
                ..Default::default()
            };
            let id = config.id.clone();
            settings_cmd::add_ai_config(state, config).await?;
            println!("已添加模型配置 {}", id);
        }
        ConfigAction::RemoveAi { id } => {
            settings_cmd::remove_ai_config(state, id).await?;
        }
        ConfigAction::UseAi { id } => {
            settings_cmd::set_active_ai_config(state, id).await?;
        }
        ConfigAction::TestAi { id } => {
            let settings = settings_cmd::get_settings(state).await?;
            let config = match id {
                Some(id) => settings.ai_configs.iter().find(|c| c.id == id).cloned(),
                None => settings.active_ai_config().cloned(),
            }
            .ok_or("未找到模型配置".to_string())?;
            let reply = settings_cmd::test_ai_config(config).await?;
            println!("{}", reply);
        }
        ConfigAction::SetScoreMode { mode } => {
            settings_cmd::set_score_mode(state, mode.into()).await?;
        }
        ConfigAction::SetMaxAttachments { max } => {
            settings_cmd::set_max_attachments(state, max).await?;
        }
        ConfigAction::SetStoreKey { key } => {
            let n = settings_cmd::set_store_key(state, key).await?;
            println!("记录库已切换，现有 {} 条记录", n);
        }
    }
    Ok(())
}

async fn run(state: &AppState, command: Commands) -> Result<(), String> {
    match command {
        Commands::Record { action } => run_record(state, action).await,
        Commands::Sectors => {
            let sectors = analysis_cmd::get_persistent_sectors(state).await?;
            if sectors.is_empty() {
                println!("暂无持续性板块");
            }
            for s in &sectors {
                println!("{}  {}次", s.name, s.count);
            }
            Ok(())
        }
        Commands::Classify => print_json(&analysis_cmd::classify_working_record(state).await?),
        Commands::Attach { action } => {
            match action {
                AttachAction::Add { paths } => {
                    for path in paths {
                        ai_cmd::attach_file(state, path).await?;
                    }
                    println!("{}", ai_cmd::list_attachments(state).await?.join("\n"));
                }
                AttachAction::List => println!("{}", ai_cmd::list_attachments(state).await?.join("\n")),
                AttachAction::Clear => ai_cmd::clear_attachments(state).await?,
            }
            Ok(())
        }
        Commands::Ai { action } => run_ai(state, action).await,
        Commands::Config { action } => run_config(state, action).await,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let cli = Cli::parse();
    let data_dir = cli
        .data_dir
        .or_else(|| dirs::data_dir().map(|d| d.join("dragon-faith")))
        .ok_or_else(|| anyhow!("无法确定数据目录，请使用 --data-dir"))?;

    let state = AppState::open(data_dir)?;
    if state.restore_draft()? {
        log::debug!("已恢复工作副本");
    }

    let result = run(&state, cli.command).await;
    // 失败时也保留已做的修改
    state.persist_draft()?;
    result.map_err(|e| anyhow!(e))
}
