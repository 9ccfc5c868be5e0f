use devboot_core::port::{PortReclaimer, ReclaimOutcome};

pub fn run(port: u16, check: bool) -> anyhow::Result<()> {
    let reclaimer = PortReclaimer::for_platform();

    if check {
        let occupancy = reclaimer.occupancy(port);
        match occupancy.pid {
            Some(pid) => println!("Port {port} is held by PID {pid}"),
            None if devboot_core::port::is_occupied(port) => {
                println!("Port {port} is in use (owner unknown)")
            }
            None => println!("Port {port} is free"),
        }
        return Ok(());
    }

    match reclaimer.reclaim(port) {
        ReclaimOutcome::AlreadyFree => println!("Port {port} is already free"),
        ReclaimOutcome::Freed { terminated } => {
            println!("Port {port} freed (terminated {})", pid_list(&terminated))
        }
        ReclaimOutcome::StillOccupied { terminated } => {
            // Not an error: the caller decides whether a busy port matters.
            println!(
                "Port {port} is still occupied after terminating {}",
                pid_list(&terminated)
            )
        }
    }
    Ok(())
}

fn pid_list(pids: &[u32]) -> String {
    if pids.is_empty() {
        return "no processes".to_string();
    }
    let pids: Vec<String> = pids.iter().map(|p| format!("PID {p}")).collect();
    pids.join(", ")
}
