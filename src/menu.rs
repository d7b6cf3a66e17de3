use std::io::{self, BufRead, Write};

pub fn show_menu() {
    println!("\n===========================================");
    println!("Ras-Eye");
    println!("===========================================");
    println!("Select an option:");
    println!("1. Face tracking (camera + servos + proximity LED)");
    println!("2. Ultrasonic range test (sensor + LED only)");
    println!("3. Show configuration");
    println!("4. Exit");
    println!("Ctrl-C stops a running mode and returns here; errors exit.");
    println!("===========================================");
    print!("Choice (1-4): ");
    let _ = io::stdout().flush();
}

/// `Ok(None)` for anything that is not a number; end of input is an error so
/// a closed stdin cannot spin the menu forever.
pub fn get_user_choice(input: &mut impl BufRead) -> io::Result<Option<u32>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed"));
    }
    Ok(line.trim().parse::<u32>().ok())
}

pub fn wait_for_enter(input: &mut impl BufRead) -> io::Result<()> {
    println!("\nPress Enter to return to menu...");
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(())
}
