/// 页面分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageClass {
    /// 提交成功页（带二维码）
    SuccessPage,
    /// 填报页第一步
    FormStep1,
    /// 其他页面或尚未渲染完成
    Neither,
}

/// 页面观察者发出的变化事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEvent {
    pub url: String,
    pub class: PageClass,
}
