/// 终端控件的输出端；输入数据由宿主转交给 `Workbench::terminal_input`。
pub trait TerminalSink: Send + Sync {
    fn write(&self, text: &str);

    fn writeln(&self, text: &str) {
        self.write(text);
        self.write("\r\n");
    }
}
