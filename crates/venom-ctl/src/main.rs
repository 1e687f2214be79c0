//! venom-ctl: command-line interface for the venom daemon.

mod cmd;

use anyhow::{Context, Result};

use cmd::proxies::{cmd_create, cmd_delete, cmd_inspect, cmd_list, cmd_reset, cmd_toggle};
use cmd::toxics::{cmd_toxic_add, cmd_toxic_remove, cmd_toxic_update};

const DEFAULT_PORT: u16 = 8474;

fn print_usage() {
    println!("Usage: venom-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  list                                   List proxies");
    println!("  inspect <proxy>                        Show a proxy and its toxics");
    println!("  create <name> <listen> <upstream>      Create and start a proxy");
    println!("  delete <proxy>                         Stop and delete a proxy");
    println!("  toggle <proxy>                         Enable or disable a proxy");
    println!("  toxic add <proxy> <type> [flags]       Add a toxic");
    println!("  toxic update <proxy> <toxic> [flags]   Change toxicity or attributes");
    println!("  toxic remove <proxy> <toxic>           Remove a toxic");
    println!("  reset                                  Enable all proxies, remove all toxics");
    println!();
    println!("Toxic flags:");
    println!("  -n <name>        Toxic name (default: <type>_<stream>)");
    println!("  -u | -d          Upstream or downstream (default: downstream)");
    println!("  -t <toxicity>    Probability in [0, 1] that the toxic applies");
    println!("  -a <key=value>   Attribute, repeatable (e.g. -a latency=100)");
    println!();
    println!("Options:");
    println!("  --port <port>   API port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["list"] | [] => cmd_list(port).await,
        ["inspect", proxy] => cmd_inspect(port, proxy).await,
        ["create", name, listen, upstream] => cmd_create(port, name, listen, upstream).await,
        ["delete", proxy] => cmd_delete(port, proxy).await,
        ["toggle", proxy] => cmd_toggle(port, proxy).await,
        ["toxic", "add", proxy, kind, flags @ ..] => cmd_toxic_add(port, proxy, kind, flags).await,
        ["toxic", "update", proxy, toxic, flags @ ..] => {
            cmd_toxic_update(port, proxy, toxic, flags).await
        }
        ["toxic", "remove", proxy, toxic] => cmd_toxic_remove(port, proxy, toxic).await,
        ["reset"] => cmd_reset(port).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
