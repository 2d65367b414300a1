use std::io::Write;

use clap::{Parser, Subcommand, ValueEnum};

use libinasyl::augmentation::Augmentation;
use libinasyl::graph::TagMode;
use libinasyl::lm::ngram_model::BuildTables;
use libinasyl::lm::smoothing::SmoothingMethod;

use crate::subcmd::augment::augment;
use crate::subcmd::build_ngram::{build_ngram, BuildNgramOptions};
use crate::subcmd::compare::compare;
use crate::subcmd::dump_ngram::dump_ngram;
use crate::subcmd::evaluate::{evaluate, EvaluateCliOptions};
use crate::subcmd::init_config::init_config;
use crate::subcmd::tag::{tag, TagOptions};

mod subcmd;
mod utils;

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[clap(
name = env ! ("CARGO_PKG_NAME"),
version = env ! ("CARGO_PKG_VERSION"),
about = env ! ("CARGO_PKG_DESCRIPTION"),
arg_required_else_help = true,
)]
struct Args {
    #[clap(flatten)]
    verbose: clap_verbosity_flag::Verbosity,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[clap(arg_required_else_help = true)]
    BuildNgram(BuildNgramArgs),
    Tag(TagArgs),
    #[clap(arg_required_else_help = true)]
    Evaluate(EvaluateArgs),
    #[clap(arg_required_else_help = true)]
    Augment(AugmentArgs),
    #[clap(arg_required_else_help = true)]
    DumpNgram(DumpNgramArgs),
    InitConfig(InitConfigArgs),
    #[clap(arg_required_else_help = true)]
    Compare(CompareArgs),
}

/// 学習ファイル (あるいはディレクトリ) ごとに n-gram モデルを作る
#[derive(Debug, clap::Args)]
struct BuildNgramArgs {
    #[arg(short, long, default_value_t = 3)]
    order: usize,
    #[arg(short, long, default_value_t = TagMode::Syllabification)]
    mode: TagMode,
    /// 言語設定ファイル (省略時は XDG 設定ディレクトリから読む)
    #[arg(short, long)]
    config: Option<String>,
    /// 拡張データでもモデルを作る (flip-onsets, swap-consonants, transpose-nuclei)
    #[arg(long)]
    augment: Vec<Augmentation>,
    #[arg(long, default_value = "model")]
    prefix: String,
    /// 継続数を作らない (stupid-backoff 専用のモデルになる)
    #[arg(long)]
    no_continuation: bool,
    /// 後続分布を作らない
    #[arg(long)]
    no_follow: bool,
    #[arg(long)]
    out_dir: String,
    train: Vec<String>,
}

/// 語をタグ付けする (CLI テスト用)
#[derive(Debug, clap::Args)]
struct TagArgs {
    #[arg(long)]
    model: String,
    #[arg(short, long, default_value_t = TagMode::Syllabification)]
    mode: TagMode,
    /// kn[:d], gkn[:ceiling], stupid-backoff[:alpha]
    #[arg(short, long, default_value_t = SmoothingMethod::default())]
    smoothing: SmoothingMethod,
    /// 省略時はモデルの次数
    #[arg(short, long)]
    order: Option<usize>,
    #[arg(short, long)]
    config: Option<String>,
    /// 語根辞書 (G2P で接辞の音素を固定する)
    #[arg(long)]
    roots: Option<String>,
    #[arg(long)]
    augmented_model: Option<String>,
    #[arg(long, default_value_t = 1.0)]
    augmented_weight: f64,
    #[arg(long)]
    no_prune: bool,
    /// ラティスを DOT 形式で出力する
    #[arg(long)]
    dot: bool,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// タグ付けする語 (省略時は stdin から行ごとに読み取る)
    words: Vec<String>,
}

/// テストファイルごとにタグ付けの精度を評価する
#[derive(Debug, clap::Args)]
struct EvaluateArgs {
    /// fold ごとのモデル。一つだけなら全 fold で使う
    #[arg(long, required = true)]
    model: Vec<String>,
    #[arg(long)]
    augmented_model: Vec<String>,
    #[arg(long, default_value_t = 1.0)]
    augmented_weight: f64,
    #[arg(short, long, default_value_t = TagMode::Syllabification)]
    mode: TagMode,
    #[arg(short, long, default_value_t = SmoothingMethod::default())]
    smoothing: SmoothingMethod,
    #[arg(short, long)]
    order: Option<usize>,
    #[arg(short, long)]
    config: Option<String>,
    #[arg(long)]
    roots: Option<String>,
    #[arg(long)]
    no_prune: bool,
    /// 正解ラベルなしで予測だけを出す
    #[arg(long)]
    no_validation: bool,
    #[arg(short, long)]
    threads: Option<usize>,
    #[arg(long)]
    out_dir: String,
    test: Vec<String>,
}

/// 学習データを拡張する
#[derive(Debug, clap::Args)]
struct AugmentArgs {
    #[arg(short, long, required = true)]
    method: Vec<Augmentation>,
    #[arg(short, long)]
    config: Option<String>,
    /// 元のデータも出力に含める
    #[arg(long)]
    include_original: bool,
    src_file: String,
    dst_file: String,
}

/// n-gram モデルのある次数の頻度をダンプする
#[derive(Debug, clap::Args)]
struct DumpNgramArgs {
    #[arg(short = 'k', long, default_value_t = 1)]
    order: usize,
    model: String,
}

/// 既定の言語設定ファイルを書き出す
#[derive(Debug, clap::Args)]
struct InitConfigArgs {
    /// 省略時は XDG 設定ディレクトリ
    path: Option<String>,
    #[arg(short, long)]
    force: bool,
}

/// 二つの評価結果を突き合わせる
#[derive(Debug, clap::Args)]
struct CompareArgs {
    #[arg(short, long, default_value_t = TagMode::Syllabification)]
    mode: TagMode,
    #[arg(short, long)]
    config: Option<String>,
    /// 一つめの結果で誤った語を選ぶ (省略時は正解した語)
    #[arg(long)]
    first_wrong: bool,
    #[arg(long)]
    second_wrong: bool,
    first: String,
    second: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .format(|buf, record| {
            let ts = buf.timestamp_micros();
            // show thread id
            writeln!(
                buf,
                "{}: {:?}: {}: {}",
                ts,
                std::thread::current().id(),
                record.level(),
                record.args()
            )
        })
        .init();

    match args.command {
        Commands::BuildNgram(opt) => build_ngram(BuildNgramOptions {
            train: &opt.train,
            order: opt.order,
            mode: opt.mode,
            config: opt.config.as_deref(),
            augmentations: opt.augment,
            prefix: opt.prefix,
            tables: BuildTables {
                continuation: !opt.no_continuation,
                follow: !opt.no_follow,
            },
            out_dir: &opt.out_dir,
        }),
        Commands::Tag(opt) => tag(TagOptions {
            words: opt.words,
            model: &opt.model,
            mode: opt.mode,
            method: opt.smoothing,
            order: opt.order,
            config: opt.config.as_deref(),
            roots: opt.roots.as_deref(),
            augmented: opt
                .augmented_model
                .as_deref()
                .map(|path| (path, opt.augmented_weight)),
            prune: !opt.no_prune,
            dot: opt.dot,
            json_output: matches!(opt.format, OutputFormat::Json),
        }),
        Commands::Evaluate(opt) => evaluate(EvaluateCliOptions {
            test: &opt.test,
            models: &opt.model,
            augmented_models: &opt.augmented_model,
            augmented_weight: opt.augmented_weight,
            mode: opt.mode,
            method: opt.smoothing,
            order: opt.order,
            config: opt.config.as_deref(),
            roots: opt.roots.as_deref(),
            prune: !opt.no_prune,
            validation: !opt.no_validation,
            threads: opt.threads,
            out_dir: &opt.out_dir,
        }),
        Commands::Augment(opt) => augment(
            &opt.src_file,
            &opt.dst_file,
            &opt.method,
            opt.config.as_deref(),
            opt.include_original,
        ),
        Commands::DumpNgram(opt) => dump_ngram(&opt.model, opt.order),
        Commands::InitConfig(opt) => init_config(opt.path.as_deref(), opt.force),
        Commands::Compare(opt) => compare(
            &opt.first,
            &opt.second,
            opt.first_wrong,
            opt.second_wrong,
            opt.mode,
            opt.config.as_deref(),
        ),
    }
}
