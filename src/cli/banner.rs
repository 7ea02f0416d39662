use colored::Colorize;

/// Display Pocket banner (for help/main command only)
pub fn display_banner() {
    let banner = r#"
 ██████╗  ██████╗  ██████╗██╗  ██╗███████╗████████╗
 ██╔══██╗██╔═══██╗██╔════╝██║ ██╔╝██╔════╝╚══██╔══╝
 ██████╔╝██║   ██║██║     █████╔╝ █████╗     ██║
 ██╔═══╝ ██║   ██║██║     ██╔═██╗ ██╔══╝     ██║
 ██║     ╚██████╔╝╚██████╗██║  ██╗███████╗   ██║
 ╚═╝      ╚═════╝  ╚═════╝╚═╝  ╚═╝╚══════╝   ╚═╝
    "#;

    println!("{}", banner.truecolor(37, 150, 190));
    println!("{}", "  Pocket".truecolor(86, 33, 213));
    println!(
        "{}",
        "  Exploit module runner with bounded multi-target dispatch\n".truecolor(120, 120, 130)
    );
}
