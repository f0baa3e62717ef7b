use std::io;
use std::path;

use anyhow::bail;
use anyhow::Result;
use clap::value_parser;
use clap::Arg;
use clap::ArgAction;
use clap::ArgGroup;
use clap::Command;
use clap_complete::generate;
use clap_complete::Generator;
use clap_complete::Shell;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;
use strum::VariantNames;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use yansi::Paint;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::ChatGateway;
use crate::domain::models::Conversation;
use crate::domain::models::Notice;
use crate::domain::models::Outfit;
use crate::domain::models::WardrobeItem;
use crate::domain::services::actions::help_text;
use crate::domain::services::Conversations;
use crate::infrastructure::gateway::http::HttpGateway;

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
    std::process::exit(0);
}

fn format_conversation(conversation: &Conversation) -> String {
    let mut res = format!("- (ID: {}) {}", conversation.id, conversation.timestamp);

    if !conversation.messages.is_empty() {
        let mut line = conversation.messages[0]
            .content
            .split('\n')
            .collect::<Vec<_>>()[0]
            .to_string();

        if line.len() >= 70 {
            line = format!("{}...", &line[..67]);
        }
        res = format!("{res}, {line}");
    }

    return res;
}

async fn print_conversations_list() -> Result<()> {
    let mut conversations = Conversations::default()
        .list_all()
        .await?
        .iter()
        .map(|conversation| {
            return format_conversation(conversation);
        })
        .collect::<Vec<String>>();

    conversations.reverse();

    if conversations.is_empty() {
        println!("There are no conversations available. You should start your first one!");
    } else {
        println!("{}", conversations.join("\n"));
    }

    return Ok(());
}

async fn create_config_file() -> Result<()> {
    let config_file_path_str = Config::default(ConfigKey::ConfigFile);
    let config_file_path = path::PathBuf::from(&config_file_path_str);
    if config_file_path.exists() {
        bail!(format!(
            "Config file already exists at {config_file_path_str}"
        ));
    }

    if !config_file_path.parent().unwrap().exists() {
        fs::create_dir_all(config_file_path.parent().unwrap()).await?;
    }

    let mut file = fs::File::create(config_file_path.clone()).await?;
    file.write_all(Config::serialize_default(build()).as_bytes())
        .await?;

    let config_path_display = config_file_path.as_os_str().to_str().unwrap();
    println!("Created default config file at {config_path_display}");
    return Ok(());
}

async fn load_conversation(conversation_id: &str) -> Result<()> {
    // Fail fast on unknown ids before the chat loop starts.
    Conversations::default().load(conversation_id).await?;
    Config::set(ConfigKey::ConversationID, conversation_id);

    return Ok(());
}

async fn load_conversation_interactive() -> Result<()> {
    let mut conversations = Conversations::default().list_all().await?;
    conversations.reverse();

    if conversations.is_empty() {
        println!("There are no conversations available. You should start your first one!");
        return Ok(());
    }

    let conversation_options = conversations
        .iter()
        .map(|conversation| {
            return format_conversation(conversation);
        })
        .collect::<Vec<String>>();

    let idx = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Which conversation would you like to resume?")
        .default(0)
        .items(&conversation_options)
        .interact_opt()?
        .unwrap();

    load_conversation(&conversations[idx].id).await?;

    return Ok(());
}

async fn run_outfits(wardrobe_file: &str) -> Result<()> {
    let payload = fs::read_to_string(wardrobe_file).await?;
    let items: Vec<WardrobeItem> = serde_yaml::from_str(&payload)?;

    if items.is_empty() {
        bail!("The wardrobe file has no items in it");
    }

    let gateway = HttpGateway::default();
    match gateway.suggest_outfits(&items).await {
        Ok(outfits) => {
            println!("{}", Outfit::format_list(&outfits));
        }
        Err(err) => {
            eprintln!("{}", Paint::red(Notice::from_gateway(&err).to_string()));
        }
    }

    return Ok(());
}

fn subcommand_completions() -> Command {
    return Command::new("completions")
        .about("Generates shell completions.")
        .arg(
            clap::Arg::new("shell")
                .short('s')
                .long("shell")
                .help("Which shell to generate completions for.")
                .action(ArgAction::Set)
                .value_parser(value_parser!(Shell))
                .required(true),
        );
}

fn subcommand_config() -> Command {
    return Command::new("config")
        .about("Configuration file options.")
        .subcommand(
            Command::new("create").about("Saves the default config file to the configuration file path. This command will fail if the file exists already.")
        )
        .subcommand(
            Command::new("default").about("Outputs the default configuration file to stdout.")
        )
        .subcommand(
            Command::new("path").about("Returns the default path for the configuration file.")
        );
}

fn subcommand_debug() -> Command {
    let mut cmd = Command::new("debug");
    cmd = cmd
        .about("Debug helpers for the concierge")
        .hide(true)
        .subcommand(Command::new("log-path").about(
            "Output path to the debug log file generated when running with environment variable RUST_LOG=concierge",
        ))
        .subcommand(Command::new("enum-config").about("List all config keys as strings."));

    return cmd;
}

fn subcommand_conversations_delete() -> Command {
    return Command::new("delete")
        .about("Delete one or all conversations.")
        .arg(
            clap::Arg::new("conversation-id")
                .short('i')
                .long("id")
                .help("Conversation ID")
                .num_args(1),
        )
        .arg(
            clap::Arg::new("all")
                .long("all")
                .help("Delete all conversations.")
                .num_args(0),
        )
        .group(
            ArgGroup::new("delete-args")
                .args(["conversation-id", "all"])
                .required(true),
        );
}

fn subcommand_chat() -> Command {
    return Command::new("chat").about("Start a new concierge chat.");
}

fn subcommand_outfits() -> Command {
    return Command::new("outfits")
        .about("Request outfit combinations for a wardrobe without entering the chat.")
        .arg(
            clap::Arg::new("file")
                .short('f')
                .long("file")
                .help("Path to a YAML wardrobe file.")
                .required(true),
        );
}

fn subcommand_conversations() -> Command {
    return Command::new("conversations")
        .about("Manage stored conversations.")
        .arg_required_else_help(true)
        .subcommand(Command::new("dir").about("Print the conversations cache directory path."))
        .subcommand(Command::new("list").about("List all stored conversations with their ids."))
        .subcommand(
            Command::new("open")
                .about("Resume a conversation by ID. Omit the ID to load an interactive selection.")
                .arg(
                    clap::Arg::new(ConfigKey::ConversationID.to_string())
                        .short('i')
                        .long("id")
                        .help("Conversation ID")
                        .required(false),
                ),
        )
        .subcommand(subcommand_conversations_delete());
}

pub fn build() -> Command {
    let commands_text = help_text()
        .split('\n')
        .map(|line| {
            if line.starts_with('-') {
                return format!("  {line}");
            }
            if line.starts_with("COMMANDS:") {
                return Paint::new(format!("CHAT {line}")).underline().bold().to_string();
            }
            return line.to_string();
        })
        .collect::<Vec<String>>()
        .join("\n");

    let about = format!(
        "{}\n\nVersion: {}",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
    );

    return Command::new("concierge")
        .about(about)
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .after_help(commands_text)
        .arg_required_else_help(false)
        .subcommand(subcommand_chat())
        .subcommand(subcommand_completions())
        .subcommand(subcommand_config())
        .subcommand(subcommand_conversations())
        .subcommand(subcommand_debug())
        .subcommand(Command::new("manpages").about("Generates manpages and outputs to stdout."))
        .subcommand(subcommand_outfits())
        .arg(
            Arg::new(ConfigKey::ConfigFile.to_string())
                .short('c')
                .long(ConfigKey::ConfigFile.to_string())
                .env("CONCIERGE_CONFIG_FILE")
                .num_args(1)
                .help(format!(
                    "Path to configuration file [default: {}]",
                    Config::default(ConfigKey::ConfigFile)
                ))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::GatewayURL.to_string())
                .long(ConfigKey::GatewayURL.to_string())
                .env("CONCIERGE_GATEWAY_URL")
                .num_args(1)
                .help(format!(
                    "Chat completion gateway URL. Can be swapped for a compatible proxy. [default: {}]",
                    Config::default(ConfigKey::GatewayURL)
                ))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::GatewayToken.to_string())
                .long(ConfigKey::GatewayToken.to_string())
                .env("CONCIERGE_GATEWAY_TOKEN")
                .num_args(1)
                .help("API token passed to the gateway as a bearer credential.")
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::GatewayTimeout.to_string())
                .long(ConfigKey::GatewayTimeout.to_string())
                .env("CONCIERGE_GATEWAY_TIMEOUT")
                .num_args(1)
                .help(format!(
                    "Time to wait in milliseconds for a whole gateway response, streamed or not. [default: {}]",
                    Config::default(ConfigKey::GatewayTimeout)
                ))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::GatewayHealthCheckTimeout.to_string())
                .long(ConfigKey::GatewayHealthCheckTimeout.to_string())
                .env("CONCIERGE_GATEWAY_HEALTH_CHECK_TIMEOUT")
                .num_args(1)
                .help(format!(
                    "Time to wait in milliseconds before timing out when doing a gateway health check. [default: {}]",
                    Config::default(ConfigKey::GatewayHealthCheckTimeout)
                ))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::UserID.to_string())
                .long(ConfigKey::UserID.to_string())
                .env("CONCIERGE_USER_ID")
                .num_args(1)
                .help("Shopper identifier forwarded with every prompt. Defaults to your username.")
                .global(true),
        );
}

pub async fn parse() -> Result<bool> {
    let matches = build().get_matches();

    match matches.subcommand() {
        Some(("debug", debug_matches)) => {
            match debug_matches.subcommand() {
                Some(("log-path", _)) => {
                    let log_path = dirs::cache_dir().unwrap().join("concierge/debug.log");
                    println!("{}", log_path.to_str().unwrap());
                }
                Some(("enum-config", _)) => {
                    let res = ConfigKey::VARIANTS.join("\n");
                    println!("{}", res);
                }
                _ => {
                    subcommand_debug().print_long_help()?;
                }
            }

            return Ok(false);
        }
        Some(("chat", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;
        }
        Some(("completions", subcmd_matches)) => {
            if let Some(completions) = subcmd_matches.get_one::<Shell>("shell").copied() {
                let mut app = build();
                print_completions(completions, &mut app);
            }
        }
        Some(("config", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("create", _)) => {
                create_config_file().await?;
                return Ok(false);
            }
            Some(("default", _)) => {
                println!("{}", Config::serialize_default(build()));
                return Ok(false);
            }
            Some(("path", _)) => {
                println!("{}", Config::default(ConfigKey::ConfigFile));
                return Ok(false);
            }
            _ => {
                subcommand_config().print_long_help()?;
                return Ok(false);
            }
        },
        Some(("conversations", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("dir", _)) => {
                let dir = Conversations::default()
                    .cache_dir
                    .to_string_lossy()
                    .to_string();
                println!("{dir}");
                return Ok(false);
            }
            Some(("list", _)) => {
                print_conversations_list().await?;
                return Ok(false);
            }
            Some(("open", open_matches)) => {
                Config::load(build(), vec![&matches, open_matches]).await?;
                if let Some(conversation_id) =
                    open_matches.get_one::<String>(&ConfigKey::ConversationID.to_string())
                {
                    load_conversation(conversation_id).await?;
                } else {
                    load_conversation_interactive().await?;
                }
            }
            Some(("delete", delete_matches)) => {
                if let Some(conversation_id) = delete_matches.get_one::<String>("conversation-id") {
                    Conversations::default().delete(conversation_id).await?;
                    println!("Deleted conversation {conversation_id}");
                } else if delete_matches.get_one::<bool>("all").is_some() {
                    Conversations::default().delete_all().await?;
                    println!("Deleted all conversations");
                } else {
                    subcommand_conversations_delete().print_long_help()?;
                }
                return Ok(false);
            }
            _ => {
                subcommand_conversations().print_long_help()?;
                return Ok(false);
            }
        },
        Some(("manpages", _)) => {
            clap_mangen::Man::new(build()).render(&mut io::stdout())?;
            return Ok(false);
        }
        Some(("outfits", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;
            let wardrobe_file = subcmd_matches.get_one::<String>("file").unwrap();
            run_outfits(wardrobe_file).await?;
            return Ok(false);
        }
        _ => {
            Config::load(build(), vec![&matches]).await?;
        }
    }

    return Ok(true);
}
