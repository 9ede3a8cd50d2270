use colored::Colorize;

pub fn header(title: &str) {
    println!("{}", title.bold().underline());
}

pub fn subheader(title: &str) {
    println!("{}", title.bold());
}

pub fn info(msg: &str) {
    eprintln!("{} {}", "info:".blue().bold(), msg);
}

pub fn success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Prints a titled list, or a dimmed "none" marker when empty.
pub fn list<I, S>(title: &str, items: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    subheader(title);
    let mut empty = true;
    for entry in items {
        println!("  {} {}", "-".dimmed(), entry.as_ref());
        empty = false;
    }
    if empty {
        println!("  {}", "none".dimmed());
    }
}
