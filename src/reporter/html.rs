//! HTML reporter: the self-contained report page
//!
//! Pre-rendered fragments (summary table, result tree, annotations table)
//! are dropped into a fixed page shell. While the run is being polled the
//! page carries a meta refresh so a browser pointed at the output file
//! follows along.

use crate::escape_html;

/// Everything the page shell needs; fragments are already HTML
#[derive(Debug, Clone, Copy)]
pub struct PageModel<'a> {
    pub title: &'a str,
    /// Run still in progress (or status unknown)
    pub running: bool,
    pub polling: bool,
    pub show_stop_control: bool,
    pub refresh_secs: u64,
    pub summary_html: &'a str,
    pub results_html: &'a str,
    pub annotations_html: &'a str,
    /// Error banners, plain text
    pub notices: &'a [String],
    /// Where the page script fetches `<id>/<field>` documents from
    pub bundle_base: Option<&'a str>,
}

/// Reporter that renders the report page
#[derive(Debug, Default)]
pub struct HtmlReporter;

impl HtmlReporter {
    pub fn new() -> Self {
        Self
    }

    /// Document title, with the running indicator when applicable
    pub fn page_title(model: &PageModel<'_>) -> String {
        if model.running {
            format!("{} (running)", model.title)
        } else {
            model.title.to_string()
        }
    }

    /// Generate the full HTML page
    pub fn page(&self, model: &PageModel<'_>) -> String {
        let title = escape_html(&Self::page_title(model));

        let mut html = String::with_capacity(
            8_192 + model.results_html.len() + model.annotations_html.len(),
        );
        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n");
        html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
        if model.polling {
            html.push_str(&format!(
                "<meta http-equiv=\"refresh\" content=\"{}\">\n",
                model.refresh_secs
            ));
        }
        html.push_str(&format!("<title>{}</title>\n", title));
        html.push_str(Self::template_style());
        html.push_str("</head>\n");
        match model.bundle_base {
            Some(base) => html.push_str(&format!("<body data-base=\"{}\">\n", escape_html(base))),
            None => html.push_str("<body>\n"),
        }
        html.push_str("<div class=\"shell\">\n<header>\n");
        html.push_str(&format!("  <h1>{}</h1>\n", title));
        if model.show_stop_control {
            html.push_str(&format!(
                "  <span class=\"stop-control\" id=\"stop-polling\">Refreshing every {}s; enter <code>stop</code> to stop polling</span>\n",
                model.refresh_secs
            ));
        }
        html.push_str("</header>\n");

        for notice in model.notices {
            html.push_str(&format!(
                "<div class=\"notice\">{}</div>\n",
                escape_html(notice)
            ));
        }

        html.push_str("<section id=\"summary\">\n<h2>Summary</h2>\n");
        html.push_str(model.summary_html);
        html.push_str("</section>\n<section id=\"results\">\n<h2>Results</h2>\n");
        html.push_str(model.results_html);
        html.push_str("</section>\n<section id=\"annotations\">\n<h2>Annotations</h2>\n");
        html.push_str(model.annotations_html);
        html.push_str("</section>\n");

        html.push_str(&format!(
            "<footer>Generated {}</footer>\n</div>\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        html.push_str(Self::template_script());
        html.push_str("</body>\n</html>\n");
        html
    }

    fn template_style() -> &'static str {
        r##"<style>
:root{--bg:#0d0d11;--surface:#16161b;--border:#2a2a32;--text:#e4e4e7;--muted:#71717a;--green:#22c55e;--yellow:#eab308;--orange:#f97316;--red:#ef4444;--blue:#3b82f6}
*{box-sizing:border-box;margin:0;padding:0}
body{font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;background:var(--bg);color:var(--text);line-height:1.5}
.shell{max-width:1100px;margin:0 auto;padding:1.25rem 1.5rem}
header{display:flex;align-items:center;gap:1.5rem;flex-wrap:wrap;padding-bottom:1rem;border-bottom:1px solid var(--border)}
header h1{font-size:1.125rem;font-weight:700}
.stop-control{font-size:.8125rem;color:var(--muted)}
.notice{margin-top:1rem;padding:.5rem .75rem;border:1px solid var(--red);border-radius:8px;color:var(--red);font-size:.8125rem}
section{margin-top:1.5rem}
h2{font-size:.75rem;text-transform:uppercase;letter-spacing:.5px;color:var(--muted);margin-bottom:.5rem}
table{border-collapse:collapse;font-size:.8125rem}
td,th{padding:.25rem .75rem;border-bottom:1px solid var(--border);text-align:left;vertical-align:top}
.outcome-pass{color:var(--green)}.outcome-fail{color:var(--red)}.outcome-error{color:var(--orange)}.outcome-untested{color:var(--yellow)}
.scope,.empty{font-size:.8125rem;color:var(--muted);margin-bottom:.5rem}
ul.results,ul.fields{list-style:none}
ul.fields{padding-left:1.25rem}
li.test,li.field{padding:.2rem 0}
.label{cursor:pointer;user-select:none}
.label::before{content:'\25B8';display:inline-block;width:1rem;color:var(--muted)}
.expanded>.label::before{content:'\25BE'}
.collapsed>ul.fields,.collapsed>.content{display:none}
.tag{font-size:.6875rem;font-weight:700;padding:.1rem .375rem;border-radius:4px}
.tag.pass{background:rgba(34,197,94,.15)}.tag.fail{background:rgba(239,68,68,.15)}.tag.error{background:rgba(249,115,22,.15)}.tag.untested{background:rgba(234,179,8,.12)}
.cause{color:var(--muted);font-style:italic}
.content{margin:.25rem 0 .5rem 1rem;padding:.5rem;background:var(--surface);border-radius:6px;overflow-x:auto}
.content.loading{color:var(--muted)}
.content.failed{color:var(--red)}
.running{color:var(--blue)}
.none{color:var(--muted)}
footer{margin-top:2rem;font-size:.75rem;color:var(--muted)}
</style>
"##
    }

    fn template_script() -> &'static str {
        r##"<script>
(function(){
"use strict";
/* fold state survives the meta refresh; keyed by data-node */
const KEY='qmreport:'+location.pathname;
let folds={};
try{folds=JSON.parse(sessionStorage.getItem(KEY)||'{}')||{};}catch(e){folds={};}
function save(){
  try{sessionStorage.setItem(KEY,JSON.stringify(folds));}catch(e){}
}
function setOpen(li,open){
  li.classList.toggle('expanded',open);
  li.classList.toggle('collapsed',!open);
}
function content(li){
  let c=li.querySelector(':scope>.content');
  if(!c){c=document.createElement('div');li.appendChild(c);}
  return c;
}
function load(li){
  if(!li.classList.contains('not-loaded')&&!li.classList.contains('failed'))return;
  const path=li.dataset.node.split('/').map(encodeURIComponent).join('/');
  const url=new URL(path,document.body.dataset.base||location.href);
  li.classList.remove('not-loaded','failed');
  li.classList.add('loading');
  const c=content(li);
  c.className='content loading';
  c.textContent='loading\u2026';
  fetch(url).then(function(r){
    if(!r.ok)throw new Error(r.status+' '+r.statusText);
    return r.text();
  }).then(function(body){
    li.classList.replace('loading','loaded');
    c.className='content';
    c.innerHTML=body;
  }).catch(function(err){
    li.classList.replace('loading','failed');
    c.className='content failed';
    c.textContent='failed to load: '+err.message+' (expand again to retry)';
  });
}
document.querySelectorAll('li.test[data-node],li.field[data-node]').forEach(function(li){
  const node=li.dataset.node;
  if(Object.prototype.hasOwnProperty.call(folds,node))setOpen(li,folds[node]);
  if(li.classList.contains('field')&&li.classList.contains('expanded'))load(li);
  const l=li.querySelector(':scope>.label');
  if(!l)return;
  l.addEventListener('click',function(){
    const open=!li.classList.contains('expanded');
    setOpen(li,open);
    folds[node]=open;
    if(open&&li.classList.contains('field')){
      const parent=li.closest('li.test');
      if(parent&&!parent.classList.contains('expanded')){
        setOpen(parent,true);
        folds[parent.dataset.node]=true;
      }
      load(li);
    }
    save();
  });
});
})();
</script>
"##
    }
}
